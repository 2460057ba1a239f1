use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdf-split")]
#[command(about = "A CLI tool for splitting PDF documents into one file per chapter")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output directory for archives and manifests
    #[arg(short, long, global = true, default_value = "./output")]
    pub output: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split PDF files into per-chapter archives
    Split(SplitArgs),

    /// Detect chapters without splitting
    Detect(DetectArgs),

    /// Validate input sources
    Validate(ValidateArgs),
}

#[derive(Args)]
pub struct SplitArgs {
    /// Input sources (PDF files or directories)
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Outline depth and index levels in file names (1 = chapter, 2 = section, 3 = subsection)
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u8).range(1..=3))]
    pub granularity: u8,

    /// Edited chapter list (JSON) to use instead of detection; single source only
    #[arg(long, value_name = "FILE")]
    pub chapters: Option<PathBuf>,

    /// Write a chapter manifest next to each archive
    #[arg(long)]
    pub include_metadata: bool,

    /// Allow writing into a non-empty output directory
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct DetectArgs {
    /// Input sources (PDF files or directories)
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Outline depth (1 = chapter, 2 = section, 3 = subsection)
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u8).range(1..=3))]
    pub granularity: u8,

    /// Write detected chapters to a JSON file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    /// Show a text preview of every page
    #[arg(long)]
    pub detailed: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Input sources (PDF files or directories)
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,
}
