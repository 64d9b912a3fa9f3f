//! CLI argument parsing.

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use svelte_syntax::{LexMode, ParseConfig, ScriptLang};

/// Parse Svelte components and print their syntax trees.
#[derive(Debug, Parser)]
#[command(name = "svelte-parse")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Files or directories to parse; directories are searched for `.svelte` files
    #[arg(default_value = ".")]
    pub paths: Vec<Utf8PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    pub output: OutputFormat,

    /// Script language, detected from `<script lang>` when omitted
    #[arg(long, value_enum)]
    pub lang: Option<LangArg>,

    /// What the input files contain
    #[arg(long, value_enum, default_value = "markup")]
    pub mode: ModeArg,

    /// Keep script regions as opaque text instead of parsing them
    #[arg(long = "no-delegate")]
    pub no_delegate: bool,

    /// Exit with an error status when any file has parse errors
    #[arg(long = "fail-on-errors")]
    pub fail_on_errors: bool,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Diagnostics with source snippets (default)
    #[default]
    Human,
    /// Indented concrete syntax tree
    Tree,
    /// One token per line
    Tokens,
    /// Diagnostics and typed AST as JSON
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LangArg {
    Js,
    Ts,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum ModeArg {
    /// Whole components
    #[default]
    Markup,
    /// Bare script bodies
    Script,
    /// Bare style bodies
    Style,
}

impl Args {
    /// The parser configuration selected by the flags.
    pub fn parse_config(&self) -> ParseConfig {
        ParseConfig {
            start_mode: match self.mode {
                ModeArg::Markup => LexMode::Markup,
                ModeArg::Script => LexMode::Script,
                ModeArg::Style => LexMode::Style,
            },
            lang: self.lang.map(|lang| match lang {
                LangArg::Js => ScriptLang::JavaScript,
                LangArg::Ts => ScriptLang::TypeScript,
            }),
            delegate: !self.no_delegate,
        }
    }

    /// The default `tracing` filter for the verbosity level.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}
