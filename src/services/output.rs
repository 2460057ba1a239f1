use crate::error::{ChapterSplitterError, Result};
use crate::services::loader::SourceLoader;
use crate::services::naming;
use crate::types::{Chapter, DetectionSource, Granularity, SourceMetadata};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Everything written next to an archive when a manifest is requested.
#[derive(Debug, Serialize)]
pub struct ChapterManifest<'a> {
    pub source: &'a SourceMetadata,
    pub archive: String,
    pub granularity: Granularity,
    pub detection_source: Option<DetectionSource>,
    pub total_pages: usize,
    pub exported_files: &'a [String],
    pub chapters: &'a [Chapter],
    pub created_at: String,
}

pub struct OutputWriter;

impl OutputWriter {
    /// Creates the output directory. An existing non-empty directory is
    /// refused unless `force` is set.
    pub async fn ensure_output_directory(output_dir: &Path, force: bool) -> Result<()> {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir).await.map_err(|e| {
                ChapterSplitterError::OutputDirectory {
                    reason: format!("Failed to create output directory: {}", e),
                }
            })?;
            info!("Created output directory: {}", output_dir.display());
            return Ok(());
        }

        if !force {
            let mut entries = fs::read_dir(output_dir).await.map_err(|e| {
                ChapterSplitterError::OutputDirectory {
                    reason: format!("Cannot read output directory: {}", e),
                }
            })?;
            if entries.next_entry().await?.is_some() {
                return Err(ChapterSplitterError::OutputDirectory {
                    reason: "Output directory is not empty. Use --force to overwrite.".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Refuses a batch in which two sources would write the same archive
    /// (and manifest). Names are compared case-insensitively.
    pub fn ensure_unique_outputs(sources: &[PathBuf]) -> Result<()> {
        let mut claimed: HashMap<String, &Path> = HashMap::new();
        for source in sources {
            let archive = naming::archive_name(&SourceLoader::file_name(source));
            match claimed.entry(archive.to_lowercase()) {
                Entry::Occupied(first) => {
                    return Err(ChapterSplitterError::OutputDirectory {
                        reason: format!(
                            "{} and {} would both be written as {}",
                            first.get().display(),
                            source.display(),
                            archive
                        ),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(source);
                }
            }
        }
        Ok(())
    }

    pub fn manifest_file_name(file_name: &str) -> String {
        format!("{}-chapters.json", naming::book_name(file_name))
    }

    pub async fn write_archive(output_dir: &Path, archive_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = output_dir.join(archive_name);
        fs::write(&path, bytes).await.map_err(|e| ChapterSplitterError::OutputDirectory {
            reason: format!("Failed to write archive {}: {}", path.display(), e),
        })?;
        info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    pub async fn write_manifest(output_dir: &Path, manifest: &ChapterManifest<'_>) -> Result<PathBuf> {
        let path = output_dir.join(Self::manifest_file_name(&manifest.source.file_name));
        let json = serde_json::to_string_pretty(manifest)?;

        fs::write(&path, json).await.map_err(|e| ChapterSplitterError::OutputDirectory {
            reason: format!("Failed to write manifest file: {}", e),
        })?;

        info!("Generated manifest file: {}", path.display());
        Ok(path)
    }

    /// Reads a chapter list previously written by `detect --json-output` or a
    /// manifest. Accepts a bare array, an object with a `chapters` array, or
    /// a map of sources to such objects when it holds exactly one entry.
    pub async fn read_chapters(path: &Path) -> Result<Vec<Chapter>> {
        let raw = fs::read_to_string(path).await.map_err(|_| ChapterSplitterError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        Self::chapters_from_value(value)
    }

    fn chapters_from_value(value: serde_json::Value) -> Result<Vec<Chapter>> {
        match value {
            serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
            serde_json::Value::Object(mut map) => {
                if let Some(chapters) = map.remove("chapters") {
                    return Ok(serde_json::from_value(chapters)?);
                }
                if map.len() == 1 {
                    if let Some((_, inner)) = map.into_iter().next() {
                        return Self::chapters_from_value(inner);
                    }
                }
                Err(ChapterSplitterError::Session {
                    reason: "chapter file must hold a single chapter list".to_string(),
                })
            }
            _ => Err(ChapterSplitterError::Session {
                reason: "chapter file must hold a chapter list".to_string(),
            }),
        }
    }
}
