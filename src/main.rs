mod cli;
mod error;
mod services;
mod types;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, DetectArgs, SplitArgs, ValidateArgs};
use error::{ChapterSplitterError, Result};
use services::{ChapterManifest, OutputWriter, SourceLoader, SplitSession};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, info, Level};
use tracing_subscriber::EnvFilter;
use types::{ExportProgress, Granularity, SplitConfig, SplitResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Split(args) => handle_split_command(args, &cli.output).await,
        Commands::Detect(args) => handle_detect_command(args).await,
        Commands::Validate(args) => handle_validate_command(args).await,
    };

    if let Err(e) = result {
        error!("Operation failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn handle_split_command(args: &SplitArgs, output_dir: &Path) -> Result<()> {
    info!("Starting split operation with {} sources", args.sources.len());

    let sources = SourceLoader::validate_sources(&args.sources)?;
    OutputWriter::ensure_unique_outputs(&sources)?;
    info!("Validated {} sources", sources.len());

    if args.chapters.is_some() && sources.len() != 1 {
        return Err(ChapterSplitterError::Session {
            reason: "--chapters needs exactly one source".to_string(),
        });
    }

    let config = SplitConfig {
        granularity: Granularity::try_from(args.granularity)?,
        output_dir: output_dir.to_path_buf(),
        include_metadata: args.include_metadata,
        force: args.force,
    };

    OutputWriter::ensure_output_directory(&config.output_dir, config.force).await?;

    for (idx, source) in sources.iter().enumerate() {
        info!("Processing source {}/{}: {}", idx + 1, sources.len(), source.display());

        let result = split_source(source, args.chapters.as_deref(), &config).await?;

        info!(
            "Created {} ({} bytes) with {} chapter files",
            result.archive_path.display(),
            result.archive_size,
            result.exported_files.len()
        );
        for file in &result.exported_files {
            info!("  - {}", file);
        }
        if result.skipped_chapters > 0 {
            info!("  ({} empty chapters skipped)", result.skipped_chapters);
        }
        if let Some(metadata_file) = &result.metadata_file {
            info!("  - {} (manifest)", metadata_file.display());
        }
    }

    info!("Split operation completed successfully!");
    Ok(())
}

async fn split_source(
    source: &Path,
    chapters_file: Option<&Path>,
    config: &SplitConfig,
) -> Result<SplitResult> {
    let (bytes, metadata) = SourceLoader::read_source(source).await?;
    let mut session = SplitSession::from_bytes(&metadata.file_name, bytes).await?;

    match chapters_file {
        Some(path) => {
            session.set_granularity(config.granularity);
            session.set_chapters(OutputWriter::read_chapters(path).await?)?;
            info!("Loaded {} chapters from {}", session.chapters().len(), path.display());
        }
        None => {
            session.detect(config.granularity).await?;
        }
    }

    for chapter in session.chapters() {
        debug!(
            "  {} pages {}-{}: {}",
            chapter.index_code.as_deref().unwrap_or("--"),
            chapter.start_page,
            chapter.end_page,
            chapter.title
        );
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<ExportProgress>();
    let reporter = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.file_name {
                Some(name) => info!("  [{:>3}%] {}", event.percent, name),
                None => info!("  [{:>3}%] (skipped)", event.percent),
            }
        }
    });

    let split = session.split(Some(&tx)).await.map(|archive| archive.to_vec());
    drop(tx);
    reporter.await.context("Progress reporter stopped unexpectedly")?;
    let archive = split?;

    let archive_name = session
        .archive_name()
        .unwrap_or_else(|| format!("{}-Splited.zip", metadata.file_name));
    let archive_path =
        OutputWriter::write_archive(&config.output_dir, &archive_name, &archive).await?;

    let metadata_file = if config.include_metadata {
        let manifest = ChapterManifest {
            source: &metadata,
            archive: archive_name,
            granularity: session.granularity(),
            detection_source: session.detection_source(),
            total_pages: session.page_count().unwrap_or_default(),
            exported_files: session.exported_files(),
            chapters: session.chapters(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        Some(OutputWriter::write_manifest(&config.output_dir, &manifest).await?)
    } else {
        None
    };

    Ok(SplitResult {
        archive_path,
        archive_size: archive.len(),
        exported_files: session.exported_files().to_vec(),
        skipped_chapters: session.chapters().len() - session.exported_files().len(),
        metadata_file,
    })
}

async fn handle_detect_command(args: &DetectArgs) -> Result<()> {
    info!("Starting detection for {} sources", args.sources.len());

    let sources = SourceLoader::validate_sources(&args.sources)?;
    let granularity = Granularity::try_from(args.granularity)?;
    let mut all_reports = BTreeMap::new();

    for source in sources {
        let (bytes, metadata) = SourceLoader::read_source(&source).await?;
        let mut session = SplitSession::from_bytes(&metadata.file_name, bytes).await?;
        session.detect(granularity).await?;

        let track = session
            .detection_source()
            .map(|s| s.to_string())
            .unwrap_or_default();

        // Print detection to console
        println!("\n=== Chapters for '{}' ===", metadata.file_name);
        println!("Total pages: {}", session.page_count().unwrap_or_default());
        println!("Detection track: {}", track);
        println!("Granularity: {}", granularity);
        println!("Chapters found: {}", session.chapters().len());
        for chapter in session.chapters() {
            println!(
                "  {:<9} Pages {:>4}-{:<4} {}",
                chapter.index_code.as_deref().unwrap_or("--"),
                chapter.start_page,
                chapter.end_page,
                chapter.title
            );
        }

        if args.detailed {
            println!("\nPage Details:");
            for summary in session.page_summaries()? {
                println!("  {}", summary);
            }
        }

        all_reports.insert(
            metadata.file_name.clone(),
            serde_json::json!({
                "source": metadata,
                "total_pages": session.page_count(),
                "granularity": granularity,
                "detection_source": session.detection_source(),
                "chapters": session.chapters(),
            }),
        );
    }

    // Write JSON output if requested
    if let Some(json_path) = &args.json_output {
        let json_content = serde_json::to_string_pretty(&all_reports)
            .context("Failed to serialize detection results")?;

        tokio::fs::write(json_path, json_content)
            .await
            .context("Failed to write JSON detection file")?;

        info!("Detection results written to: {}", json_path.display());
    }

    Ok(())
}

async fn handle_validate_command(args: &ValidateArgs) -> Result<()> {
    info!("Validating {} sources", args.sources.len());

    let mut checked = 0;
    let mut invalid_sources: Vec<(String, String)> = Vec::new();

    for source in &args.sources {
        let paths = match SourceLoader::validate_sources(std::slice::from_ref(source)) {
            Ok(paths) => paths,
            Err(e) => {
                error!("✗ Invalid: {} - {}", source, e);
                checked += 1;
                invalid_sources.push((source.clone(), e.to_string()));
                continue;
            }
        };

        for path in paths {
            checked += 1;
            match SplitSession::open(&path).await {
                Ok(session) => {
                    info!(
                        "✓ Valid: {} ({} pages)",
                        path.display(),
                        session.page_count().unwrap_or_default()
                    );
                }
                Err(e) => {
                    error!("✗ Invalid: {} - {}", path.display(), e);
                    invalid_sources.push((path.display().to_string(), e.to_string()));
                }
            }
        }
    }

    println!("\n=== Validation Summary ===");
    println!("Valid sources: {}/{}", checked - invalid_sources.len(), checked);

    if !invalid_sources.is_empty() {
        println!("Invalid sources:");
        let invalid_count = invalid_sources.len();
        let paths: Vec<String> = invalid_sources.iter().map(|(s, _)| s.clone()).collect();
        for (source, error) in invalid_sources {
            println!("  - {}: {}", source, error);
        }
        return Err(ChapterSplitterError::InputFormat {
            path: paths.join(", "),
            reason: format!("{} sources failed validation", invalid_count),
        });
    }

    println!("All sources are valid!");
    Ok(())
}
