//! Main orchestration logic.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use svelte_syntax::{parse_with, SwcScriptParser};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::cli::Args;
use crate::output::{FileReport, Formatter, ParseSummary};

/// Errors that stop a run.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum CliError {
    /// A path given on the command line does not exist.
    #[error("path not found: {0}")]
    #[diagnostic(code(svelte_parse::not_found))]
    NotFound(Utf8PathBuf),

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    /// Failed to read a file or walk a directory.
    #[error("failed to read {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Expands the command line paths into the list of files to parse.
///
/// Files named explicitly are always kept; directories contribute their
/// `.svelte` files, skipping `node_modules` and hidden directories.
pub fn collect_files(paths: &[Utf8PathBuf]) -> Result<Vec<Utf8PathBuf>, CliError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            return Err(CliError::NotFound(path.clone()));
        }

        let walker = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_name().to_str().is_some_and(|name| {
                        name.starts_with('.') || name == "node_modules"
                    })
            });
        for entry in walker {
            let entry = entry.map_err(|e| CliError::Read {
                path: path.clone(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file = Utf8PathBuf::try_from(entry.into_path())
                .map_err(|e| CliError::NonUtf8Path(e.into_path_buf().display().to_string()))?;
            if file.extension() == Some("svelte") {
                files.push(file);
            }
        }
    }
    debug!(count = files.len(), "collected files");
    Ok(files)
}

fn parse_file(args: &Args, path: &Utf8Path) -> Result<FileReport, CliError> {
    let source = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_owned(),
        source,
    })?;
    let parse = parse_with(&source, &args.parse_config(), &SwcScriptParser);
    Ok(FileReport {
        path: path.to_owned(),
        source,
        parse,
    })
}

/// Parses every file and prints the reports in path order.
pub fn run(args: &Args) -> Result<ParseSummary, CliError> {
    let files = collect_files(&args.paths)?;
    let reports = files
        .par_iter()
        .map(|path| parse_file(args, path))
        .collect::<Result<Vec<_>, _>>()?;

    let formatter = Formatter::new(args.output, args.parse_config().start_mode);
    print!("{}", formatter.format(&reports));

    let summary = ParseSummary::from_reports(&reports);
    info!(files = summary.file_count, errors = summary.error_count, "done");
    if formatter.prints_summary() {
        eprintln!("{}", summary.format());
    }
    Ok(summary)
}
