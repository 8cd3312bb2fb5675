//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// docshim - convert documents through supervised sidecar processes
#[derive(Parser)]
#[command(name = "docshim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this config file instead of the global and project ones
    #[arg(long, global = true, env = "DOCSHIM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a document to HTML
    Convert(ConvertArgs),

    /// Check which formats can be converted
    Supports(SupportsArgs),

    /// Show sidecar backends and their interpreters
    Backends(BackendsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct ConvertArgs {
    /// Source format (rst, asciidoc, asciidoctor, ...)
    pub format: String,

    /// Input file (defaults to stdin)
    pub input: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fail when the converter reports warnings
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct SupportsArgs {
    /// Formats to check (defaults to the built-in ones)
    pub formats: Vec<String>,
}

#[derive(Args)]
pub struct BackendsArgs {
    /// Also start each sidecar and list the formats it confirms
    #[arg(long)]
    pub probe: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
