use crate::error::Result;
use crate::services::document::DocumentSource;
use crate::services::heuristic::HeadingDetector;
use crate::services::normalizer::RangeNormalizer;
use crate::services::outline::OutlineFlattener;
use crate::types::{Chapter, DetectionConfig, DetectionSource, Granularity, HeadingCandidate};
use serde::Serialize;
use tracing::info;

/// Raw output of whichever detection track ran. The tracks never mix.
#[derive(Debug, Clone)]
pub enum Detection {
    Outline(Vec<Chapter>),
    Heuristic(Vec<HeadingCandidate>),
}

impl Detection {
    pub fn source(&self) -> DetectionSource {
        match self {
            Detection::Outline(_) => DetectionSource::Outline,
            Detection::Heuristic(candidates) if candidates.is_empty() => DetectionSource::Fallback,
            Detection::Heuristic(_) => DetectionSource::Heuristic,
        }
    }

    /// Normalized chapter list covering `1..=total_pages`.
    pub fn into_chapters(self, total_pages: usize) -> Vec<Chapter> {
        match self {
            Detection::Outline(chapters) => RangeNormalizer::normalize(chapters, total_pages),
            Detection::Heuristic(candidates) if candidates.is_empty() => {
                vec![HeadingDetector::fallback_chapter(total_pages)]
            }
            Detection::Heuristic(candidates) => RangeNormalizer::normalize(
                HeadingDetector::candidates_to_chapters(candidates),
                total_pages,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub source: DetectionSource,
    pub total_pages: usize,
    pub granularity: Granularity,
    pub chapters: Vec<Chapter>,
}

/// Runs outline detection first and heuristic detection only when the
/// outline yields nothing.
pub struct ChapterDetector {
    headings: HeadingDetector,
}

impl ChapterDetector {
    pub fn new(config: DetectionConfig) -> Result<Self> {
        Ok(Self {
            headings: HeadingDetector::new(config)?,
        })
    }

    pub fn run<D: DocumentSource + ?Sized>(&self, doc: &D, granularity: Granularity) -> Detection {
        if let Some(outline) = doc.outline().filter(|o| !o.is_empty()) {
            let chapters = OutlineFlattener::flatten(doc, &outline, granularity);
            if !chapters.is_empty() {
                return Detection::Outline(chapters);
            }
            info!("Outline has no resolvable bookmarks, falling back to heading detection");
        }

        Detection::Heuristic(self.headings.detect(doc))
    }

    pub fn detect<D: DocumentSource + ?Sized>(
        &self,
        doc: &D,
        granularity: Granularity,
    ) -> DetectionReport {
        let total_pages = doc.page_count();
        let detection = self.run(doc, granularity);
        let source = detection.source();
        let chapters = detection.into_chapters(total_pages);

        info!(
            "Detected {} chapters via {} ({} pages, granularity {})",
            chapters.len(),
            source,
            total_pages,
            granularity
        );

        DetectionReport {
            source,
            total_pages,
            granularity,
            chapters,
        }
    }
}

impl Default for ChapterDetector {
    fn default() -> Self {
        Self {
            headings: HeadingDetector::new(DetectionConfig::default())
                .expect("default heading patterns compile"),
        }
    }
}
