use crate::error::{ChapterSplitterError, Result};
use crate::types::SourceMetadata;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Resolves command-line sources to PDF files and reads them.
pub struct SourceLoader;

impl SourceLoader {
    /// Expands every source into PDF paths. Directories are walked
    /// recursively for `*.pdf` (any case) in sorted order; plain files are
    /// kept as given.
    pub fn expand_sources(sources: &[String]) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        for source in sources {
            let path = Path::new(source);
            if path.is_dir() {
                let before = paths.len();
                for entry in WalkDir::new(path).sort_by_file_name() {
                    let entry = entry.map_err(|e| ChapterSplitterError::Anyhow(e.into()))?;
                    if entry.file_type().is_file() && Self::is_pdf(entry.path()) {
                        paths.push(entry.into_path());
                    }
                }
                if paths.len() == before {
                    warn!("No PDF files found under {}", path.display());
                } else {
                    debug!("Found {} PDF files under {}", paths.len() - before, path.display());
                }
            } else if path.is_file() {
                paths.push(path.to_path_buf());
            } else {
                return Err(ChapterSplitterError::FileNotFound {
                    path: source.clone(),
                });
            }
        }

        Ok(paths)
    }

    /// Like [`SourceLoader::expand_sources`] but fails when nothing is left.
    pub fn validate_sources(sources: &[String]) -> Result<Vec<PathBuf>> {
        let paths = Self::expand_sources(sources)?;
        if paths.is_empty() {
            return Err(ChapterSplitterError::FileNotFound {
                path: sources.join(", "),
            });
        }
        Ok(paths)
    }

    pub async fn read_source(path: &Path) -> Result<(Vec<u8>, SourceMetadata)> {
        info!("Reading file: {}", path.display());

        if !path.exists() {
            return Err(ChapterSplitterError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let bytes = fs::read(path).await?;

        let metadata = SourceMetadata {
            file_name: Self::file_name(path),
            path: path.to_path_buf(),
            size_bytes: bytes.len() as u64,
            loaded_at: chrono::Utc::now().to_rfc3339(),
        };

        Ok((bytes, metadata))
    }

    /// Name a source is staged under; archive and manifest names derive
    /// from it.
    pub fn file_name(path: &Path) -> String {
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.pdf")
            .to_string()
    }

    fn is_pdf(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false)
    }
}
