//! Output formatting.

use std::fmt::Write;

use crate::cli::OutputFormat;
use camino::Utf8PathBuf;
use serde::Serialize;
use source_map::{LineCol, LineIndex};
use svelte_syntax::{tokenize_with, LexMode, Parse, ParseError, SvelteDocument};

/// The result of parsing one file.
#[derive(Debug)]
pub struct FileReport {
    /// The file path.
    pub path: Utf8PathBuf,
    /// The file contents.
    pub source: String,
    /// The parse result.
    pub parse: Parse,
}

/// A formatted diagnostic for output.
#[derive(Debug, Serialize)]
pub struct FormattedDiagnostic {
    /// The error kind.
    pub code: &'static str,
    /// The start position.
    pub start: Position,
    /// The end position.
    pub end: Position,
    /// The message.
    pub message: String,
}

/// A position in the source.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Position {
    /// 1-indexed line number.
    pub line: u32,
    /// 1-indexed column number.
    pub column: u32,
    /// Byte offset.
    pub offset: u32,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    filename: &'a str,
    errors: Vec<FormattedDiagnostic>,
    document: SvelteDocument,
}

/// Formats parse results for output.
pub struct Formatter {
    format: OutputFormat,
    mode: LexMode,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat, mode: LexMode) -> Self {
        Self { format, mode }
    }

    /// Whether a summary line follows the output.
    pub fn prints_summary(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Formats every report in order.
    pub fn format(&self, reports: &[FileReport]) -> String {
        match self.format {
            OutputFormat::Human => reports.iter().map(format_human).collect(),
            OutputFormat::Tree => reports.iter().map(format_tree).collect(),
            OutputFormat::Tokens => reports
                .iter()
                .map(|report| format_tokens(report, self.mode))
                .collect(),
            OutputFormat::Json => format_json(reports),
        }
    }
}

fn position(line_index: &LineIndex, offset: source_map::ByteOffset) -> Position {
    let line_col = line_index.line_col(offset).unwrap_or(LineCol::new(0, 0));
    Position {
        line: line_col.line + 1,
        column: line_col.col + 1,
        offset: u32::from(offset),
    }
}

/// Converts parse errors into positioned diagnostics.
pub fn format_diagnostics(errors: &[ParseError], source: &str) -> Vec<FormattedDiagnostic> {
    let line_index = LineIndex::new(source);
    errors
        .iter()
        .map(|error| FormattedDiagnostic {
            code: error.kind.code(),
            start: position(&line_index, error.span.start),
            end: position(&line_index, error.span.end),
            message: error.to_string(),
        })
        .collect()
}

/// Human-readable output with a code snippet per error.
fn format_human(report: &FileReport) -> String {
    let lines: Vec<&str> = report.source.lines().collect();
    let mut output = String::new();

    for diag in format_diagnostics(report.parse.errors(), &report.source) {
        let _ = writeln!(
            output,
            "{}:{}:{}\nError: {} ({})",
            report.path, diag.start.line, diag.start.column, diag.message, diag.code
        );

        let line_num = diag.start.line as usize - 1;
        if let Some(line) = lines.get(line_num) {
            let gutter = " ".repeat(diag.start.line.to_string().len());
            let _ = writeln!(output, "  {} | {}", diag.start.line, line);
            let _ = writeln!(
                output,
                "  {} | {}^",
                gutter,
                " ".repeat(diag.start.column as usize - 1)
            );
        }
        output.push('\n');
    }

    output
}

fn format_tree(report: &FileReport) -> String {
    format!("// {}\n{}", report.path, report.parse.debug_tree())
}

fn format_tokens(report: &FileReport, mode: LexMode) -> String {
    let mut output = format!("// {}\n", report.path);
    for token in tokenize_with(&report.source, mode) {
        let _ = writeln!(
            output,
            "{:?}@{}..{} {:?}",
            token.kind,
            token.span.start_usize(),
            token.span.end_usize(),
            token.text
        );
    }
    output
}

fn format_json(reports: &[FileReport]) -> String {
    let json: Vec<_> = reports
        .iter()
        .map(|report| JsonReport {
            filename: report.path.as_str(),
            errors: format_diagnostics(report.parse.errors(), &report.source),
            document: report.parse.document(),
        })
        .collect();
    let mut output = serde_json::to_string_pretty(&json).unwrap_or_default();
    output.push('\n');
    output
}

/// Totals for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseSummary {
    /// Number of files parsed.
    pub file_count: usize,
    /// Number of parse errors across all files.
    pub error_count: usize,
    /// Number of files with at least one error.
    pub files_with_errors: usize,
}

impl ParseSummary {
    /// Tallies a set of reports.
    pub fn from_reports(reports: &[FileReport]) -> Self {
        reports.iter().fold(Self::default(), |mut summary, report| {
            let errors = report.parse.errors().len();
            summary.file_count += 1;
            summary.error_count += errors;
            summary.files_with_errors += usize::from(errors > 0);
            summary
        })
    }

    /// Formats the summary line.
    pub fn format(&self) -> String {
        let plural = |n: usize, word: &str| {
            if n == 1 {
                format!("{n} {word}")
            } else {
                format!("{n} {word}s")
            }
        };
        if self.error_count == 0 {
            format!(
                "svelte-parse parsed {} with no errors",
                plural(self.file_count, "file")
            )
        } else {
            format!(
                "svelte-parse found {} in {} (of {} parsed)",
                plural(self.error_count, "error"),
                plural(self.files_with_errors, "file"),
                self.file_count
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn report(source: &str) -> FileReport {
        FileReport {
            path: Utf8PathBuf::from("src/App.svelte"),
            source: source.to_string(),
            parse: svelte_syntax::parse(source),
        }
    }

    #[test]
    fn test_diagnostic_positions() {
        let report = report("<div>\n  <span></div>");
        let diags = format_diagnostics(report.parse.errors(), &report.source);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "unclosed_tag");
        assert_eq!(
            diags[0].start,
            Position {
                line: 2,
                column: 3,
                offset: 8
            }
        );
        assert_eq!(diags[0].message, "unclosed tag: <span>");
    }

    #[test]
    fn test_human_output() {
        let formatter = Formatter::new(OutputFormat::Human, LexMode::Markup);
        let output = formatter.format(&[report("<div>\n  <span></div>")]);
        insta::assert_snapshot!(output, @r"
        src/App.svelte:2:3
        Error: unclosed tag: <span> (unclosed_tag)
          2 |   <span></div>
            |   ^
        ");
    }

    #[test]
    fn test_human_output_without_errors() {
        let formatter = Formatter::new(OutputFormat::Human, LexMode::Markup);
        assert_eq!(formatter.format(&[report("<p>ok</p>")]), "");
    }

    #[test]
    fn test_tokens_output() {
        let formatter = Formatter::new(OutputFormat::Tokens, LexMode::Markup);
        insta::assert_snapshot!(formatter.format(&[report("<b>{x}</b>")]), @r#"
        // src/App.svelte
        L_ANGLE@0..1 "<"
        NAME@1..2 "b"
        R_ANGLE@2..3 ">"
        L_CURLY@3..4 "{"
        EXPR_TEXT@4..5 "x"
        R_CURLY@5..6 "}"
        L_ANGLE_SLASH@6..8 "</"
        NAME@8..9 "b"
        R_ANGLE@9..10 ">"
        "#);
    }

    #[test]
    fn test_json_output() {
        let formatter = Formatter::new(OutputFormat::Json, LexMode::Markup);
        let output = formatter.format(&[report("<p>{a}")]);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[0]["filename"], "src/App.svelte");
        assert_eq!(value[0]["errors"][0]["code"], "unclosed_tag");
        assert_eq!(value[0]["errors"][0]["start"]["line"], 1);
        assert!(value[0]["document"]["fragment"]["nodes"].is_array());
    }

    #[test]
    fn test_summary() {
        let reports = [report("<p>ok</p>"), report("<div>"), report("<a><b>")];
        let summary = ParseSummary::from_reports(&reports);
        assert_eq!(summary.file_count, 3);
        assert_eq!(summary.error_count, 3);
        assert_eq!(summary.files_with_errors, 2);
        assert_eq!(
            summary.format(),
            "svelte-parse found 3 errors in 2 files (of 3 parsed)"
        );
        assert_eq!(
            ParseSummary::from_reports(&reports[..1]).format(),
            "svelte-parse parsed 1 file with no errors"
        );
    }
}
