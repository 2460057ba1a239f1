use crate::error::{ChapterSplitterError, Result};
use crate::services::archive::ArchivePackager;
use crate::services::detector::ChapterDetector;
use crate::services::document::{DocumentSource, PageExtractor, PdfDocument};
use crate::services::exporter::ChapterExporter;
use crate::services::naming;
use crate::types::{
    Chapter, ChapterUpdate, DetectionConfig, DetectionSource, ExportProgress, Granularity,
    SessionStatus,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

const SUMMARY_RUNS: usize = 15;
const SUMMARY_CHARS: usize = 200;

/// One staged document and everything derived from it: detected chapters,
/// review edits and the finished archive.
///
/// Detection and splitting borrow the session mutably, so a handle can only
/// ever run one pass at a time.
pub struct SplitSession<D = PdfDocument> {
    status: SessionStatus,
    detector: Arc<ChapterDetector>,
    file_name: Option<String>,
    document: Option<Arc<D>>,
    granularity: Granularity,
    detection_source: Option<DetectionSource>,
    chapters: Vec<Chapter>,
    progress: u8,
    exported_files: Vec<String>,
    archive: Option<Vec<u8>>,
}

impl SplitSession<PdfDocument> {
    /// Reads and stages a PDF from disk.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ChapterSplitterError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let mut session = Self::new();
        session.stage_bytes(&file_name, bytes).await?;
        Ok(session)
    }

    pub async fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Result<Self> {
        let mut session = Self::new();
        session.stage_bytes(file_name, bytes).await?;
        Ok(session)
    }

    /// Parses and stages a new document. A rejected input leaves the session
    /// exactly as it was.
    pub async fn stage_bytes(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<()> {
        let name = file_name.to_string();
        let document = tokio::task::spawn_blocking(move || PdfDocument::load(&name, &bytes))
            .await
            .map_err(|e| ChapterSplitterError::Anyhow(e.into()))??;

        self.stage(file_name, document);
        Ok(())
    }
}

impl<D> SplitSession<D>
where
    D: DocumentSource + PageExtractor + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_detector(ChapterDetector::default())
    }

    pub fn with_config(config: DetectionConfig) -> Result<Self> {
        Ok(Self::with_detector(ChapterDetector::new(config)?))
    }

    fn with_detector(detector: ChapterDetector) -> Self {
        Self {
            status: SessionStatus::Idle,
            detector: Arc::new(detector),
            file_name: None,
            document: None,
            granularity: Granularity::default(),
            detection_source: None,
            chapters: Vec::new(),
            progress: 0,
            exported_files: Vec::new(),
            archive: None,
        }
    }

    /// Stages an already opened document, discarding any previous results.
    pub fn stage(&mut self, file_name: &str, document: D) {
        let pages = DocumentSource::page_count(&document);
        self.clear();
        self.file_name = Some(file_name.to_string());
        self.document = Some(Arc::new(document));
        self.status = SessionStatus::Staged;
        info!("Staged '{}' ({} pages)", file_name, pages);
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn page_count(&self) -> Option<usize> {
        self.document
            .as_deref()
            .map(|doc| DocumentSource::page_count(doc))
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn set_granularity(&mut self, granularity: Granularity) {
        self.granularity = granularity;
    }

    pub fn detection_source(&self) -> Option<DetectionSource> {
        self.detection_source
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn exported_files(&self) -> &[String] {
        &self.exported_files
    }

    pub fn archive(&self) -> Option<&[u8]> {
        self.archive.as_deref()
    }

    /// `<bookName>-Splited.zip` for the staged file.
    pub fn archive_name(&self) -> Option<String> {
        self.file_name.as_deref().map(naming::archive_name)
    }

    fn document(&self) -> Result<Arc<D>> {
        self.document
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| ChapterSplitterError::Session {
                reason: "no document staged".to_string(),
            })
    }

    /// Drops the archive of an earlier split; it no longer matches the
    /// chapter list.
    fn discard_output(&mut self) {
        if self.status == SessionStatus::Completed {
            self.status = SessionStatus::Reviewing;
        }
        self.progress = 0;
        self.exported_files.clear();
        self.archive = None;
    }

    fn fail(&mut self, error: ChapterSplitterError) -> ChapterSplitterError {
        warn!("Session entered error state: {}", error);
        self.status = SessionStatus::Error(error.to_string());
        error
    }

    /// Detects chapters at the given granularity and enters review.
    pub async fn detect(&mut self, granularity: Granularity) -> Result<&[Chapter]> {
        let document = self.document()?;
        self.discard_output();
        self.granularity = granularity;
        self.status = SessionStatus::Analyzing;
        info!(
            "Detecting chapters in '{}' at granularity {}",
            self.file_name.as_deref().unwrap_or_default(),
            granularity
        );

        let detector = Arc::clone(&self.detector);
        let report =
            tokio::task::spawn_blocking(move || detector.detect(document.as_ref(), granularity))
                .await;

        match report {
            Ok(report) => {
                self.detection_source = Some(report.source);
                self.chapters = report.chapters;
                self.status = SessionStatus::Reviewing;
                Ok(self.chapters.as_slice())
            }
            Err(e) => Err(self.fail(ChapterSplitterError::Anyhow(e.into()))),
        }
    }

    /// Replaces the chapter list with an edited one and enters review.
    pub fn set_chapters(&mut self, chapters: Vec<Chapter>) -> Result<()> {
        self.document()?;
        debug!("Loaded {} chapters for review", chapters.len());
        self.discard_output();
        self.chapters = chapters;
        self.status = SessionStatus::Reviewing;
        Ok(())
    }

    pub fn update_chapter(&mut self, id: &str, update: ChapterUpdate) -> Result<&Chapter> {
        let position = self.chapter_position(id)?;
        self.discard_output();
        let chapter = &mut self.chapters[position];

        if let Some(title) = update.title {
            chapter.title = title;
        }
        if let Some(start) = update.start_page {
            chapter.start_page = start;
        }
        if let Some(end) = update.end_page {
            chapter.end_page = end;
        }
        Ok(chapter)
    }

    /// Appends a one-page placeholder chapter for manual editing.
    pub fn add_chapter(&mut self) -> &Chapter {
        self.discard_output();
        let mut stamp = chrono::Utc::now().timestamp_millis();
        while self.chapters.iter().any(|c| c.id == format!("manual-{}", stamp)) {
            stamp += 1;
        }

        self.chapters.push(Chapter {
            id: format!("manual-{}", stamp),
            title: "MANUAL_SEGMENT".to_string(),
            start_page: 1,
            end_page: 1,
            index_code: Some(format!("{}.0.0", self.chapters.len() + 1)),
            main_chapter_title: None,
        });
        &self.chapters[self.chapters.len() - 1]
    }

    pub fn remove_chapter(&mut self, id: &str) -> Result<Chapter> {
        let position = self.chapter_position(id)?;
        self.discard_output();
        debug!("Removed chapter '{}'", id);
        Ok(self.chapters.remove(position))
    }

    fn chapter_position(&self, id: &str) -> Result<usize> {
        self.chapters
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ChapterSplitterError::Session {
                reason: format!("unknown chapter id '{}'", id),
            })
    }

    /// Exports every chapter and packs the results into the session archive.
    pub async fn split(
        &mut self,
        progress: Option<&UnboundedSender<ExportProgress>>,
    ) -> Result<&[u8]> {
        let document = self.document()?;
        if self.chapters.is_empty() {
            return Err(ChapterSplitterError::Session {
                reason: "no chapters to split".to_string(),
            });
        }

        self.status = SessionStatus::Splitting;
        self.discard_output();

        let book = self
            .file_name
            .as_deref()
            .map(naming::book_name)
            .unwrap_or_default();

        let result = ChapterExporter::export_all(
            document,
            &book,
            &self.chapters,
            self.granularity,
            progress,
        )
        .await;
        let exported = match result {
            Ok(exported) => exported,
            Err(e) => return Err(self.fail(e)),
        };

        let archive = match ArchivePackager::package(&exported) {
            Ok(archive) => archive,
            Err(e) => return Err(self.fail(e)),
        };

        info!(
            "Split '{}' into {} files ({} byte archive)",
            book,
            exported.len(),
            archive.len()
        );

        self.exported_files = exported.into_iter().map(|e| e.file_name).collect();
        self.progress = 100;
        self.status = SessionStatus::Completed;
        Ok(self.archive.insert(archive).as_slice())
    }

    /// Short text preview of every page.
    pub fn page_summaries(&self) -> Result<Vec<String>> {
        let document = self.document()?;
        let pages = DocumentSource::page_count(document.as_ref());

        Ok((1..=pages)
            .map(|page| {
                let runs = document.page_text_runs(page).unwrap_or_else(|e| {
                    warn!("No text for page {}: {}", page, e);
                    Vec::new()
                });
                let joined = runs
                    .iter()
                    .take(SUMMARY_RUNS)
                    .map(|r| r.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let summary: String = joined.chars().take(SUMMARY_CHARS).collect();
                format!("Page {}: {}", page, summary)
            })
            .collect())
    }

    fn clear(&mut self) {
        self.file_name = None;
        self.document = None;
        self.detection_source = None;
        self.chapters.clear();
        self.progress = 0;
        self.exported_files.clear();
        self.archive = None;
    }

    /// Drops the staged document and all results.
    pub fn reset(&mut self) {
        self.clear();
        self.status = SessionStatus::Idle;
        info!("Session reset");
    }
}

impl<D> Default for SplitSession<D>
where
    D: DocumentSource + PageExtractor + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<D> std::fmt::Debug for SplitSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitSession")
            .field("status", &self.status)
            .field("file_name", &self.file_name)
            .field("granularity", &self.granularity)
            .field("detection_source", &self.detection_source)
            .field("chapters", &self.chapters.len())
            .field("progress", &self.progress)
            .field("exported_files", &self.exported_files.len())
            .field("archive_bytes", &self.archive.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}
