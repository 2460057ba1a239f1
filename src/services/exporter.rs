use crate::error::{ChapterSplitterError, Result};
use crate::services::document::PageExtractor;
use crate::services::naming::{chapter_file_name, sanitize_file_name};
use crate::types::{Chapter, ExportProgress, ExportedChapter, Granularity};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// Materializes each chapter as a standalone document.
pub struct ChapterExporter;

impl ChapterExporter {
    /// Zero-based page indices of a chapter, clamped to the document.
    /// Empty when the chapter lies entirely outside it.
    pub fn page_indices(chapter: &Chapter, total_pages: usize) -> Vec<usize> {
        let start = chapter.start_page.max(1);
        let end = chapter.end_page.min(total_pages);
        (start - 1..end).collect()
    }

    pub fn progress_percent(completed: usize, total: usize) -> u8 {
        if total == 0 {
            return 100;
        }
        (completed as f64 / total as f64 * 100.0).round() as u8
    }

    /// Exports chapters in list order. Progress is sent after every chapter,
    /// including skipped ones; a closed receiver is ignored. The first
    /// failure aborts the remaining chapters.
    pub async fn export_all<D>(
        doc: Arc<D>,
        book_name: &str,
        chapters: &[Chapter],
        granularity: Granularity,
        progress: Option<&UnboundedSender<ExportProgress>>,
    ) -> Result<Vec<ExportedChapter>>
    where
        D: PageExtractor + Send + Sync + 'static,
    {
        let total_pages = doc.page_count();
        let sanitized_book = sanitize_file_name(book_name);
        let mut exported = Vec::new();

        info!(
            "Exporting {} chapters of '{}' at granularity {}",
            chapters.len(),
            book_name,
            granularity
        );

        for (idx, chapter) in chapters.iter().enumerate() {
            let indices = Self::page_indices(chapter, total_pages);

            let file_name = if indices.is_empty() {
                debug!(
                    "Skipping '{}': pages {}-{} fall outside 1-{}",
                    chapter.title, chapter.start_page, chapter.end_page, total_pages
                );
                None
            } else {
                let file_name = chapter_file_name(chapter, idx + 1, granularity, &sanitized_book);
                let pages = (indices[0] + 1, indices[indices.len() - 1] + 1);
                let bytes = Self::extract(Arc::clone(&doc), chapter, indices).await?;
                debug!(
                    "Exported {} (pages {}-{}, {} bytes)",
                    file_name,
                    pages.0,
                    pages.1,
                    bytes.len()
                );

                exported.push(ExportedChapter {
                    chapter_id: chapter.id.clone(),
                    file_name: file_name.clone(),
                    bytes,
                });
                Some(file_name)
            };

            if let Some(tx) = progress {
                let _ = tx.send(ExportProgress {
                    completed: idx + 1,
                    total: chapters.len(),
                    percent: Self::progress_percent(idx + 1, chapters.len()),
                    file_name,
                });
            }
        }

        info!(
            "Exported {} files, skipped {} empty chapters",
            exported.len(),
            chapters.len() - exported.len()
        );
        Ok(exported)
    }

    async fn extract<D>(doc: Arc<D>, chapter: &Chapter, indices: Vec<usize>) -> Result<Vec<u8>>
    where
        D: PageExtractor + Send + Sync + 'static,
    {
        let title = chapter.title.clone();
        let result = tokio::task::spawn_blocking(move || doc.extract_pages(&indices))
            .await
            .map_err(|e| ChapterSplitterError::Export {
                chapter: title.clone(),
                reason: format!("extraction task failed: {}", e),
            })?;

        result.map_err(|e| match e {
            ChapterSplitterError::Export { reason, .. } => ChapterSplitterError::Export {
                chapter: title,
                reason,
            },
            other => ChapterSplitterError::Export {
                chapter: title,
                reason: other.to_string(),
            },
        })
    }
}
