use crate::error::{ChapterSplitterError, Result};
use crate::services::document::DocumentSource;
use crate::services::naming::format_index_code;
use crate::types::{Chapter, DetectionConfig, HeadingCandidate, TextRun};
use regex::Regex;
use tracing::{debug, info, warn};

/// Finds chapter headings from text geometry when a document has no
/// usable outline.
pub struct HeadingDetector {
    config: DetectionConfig,
    patterns: Vec<(Regex, i32)>,
}

impl HeadingDetector {
    pub fn new(config: DetectionConfig) -> Result<Self> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                Regex::new(&p.pattern)
                    .map(|re| (re, p.weight))
                    .map_err(|e| ChapterSplitterError::InvalidPattern {
                        pattern: p.pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { config, patterns })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Absolute horizontal scale of the run, falling back to the vertical
    /// scale, the run height and finally the configured default.
    pub fn font_size(&self, run: &TextRun) -> f64 {
        [run.transform[0], run.transform[3], run.height]
            .into_iter()
            .find(|v| *v != 0.0 && !v.is_nan())
            .unwrap_or(self.config.default_font_size)
            .abs()
    }

    /// Heading score of a trimmed run text at the given font size.
    pub fn score(&self, text: &str, font_size: f64) -> i32 {
        let mut score = 0;
        if font_size > self.config.large_font_size {
            score += 5;
        }
        if font_size > self.config.huge_font_size {
            score += 10;
        }
        for (pattern, weight) in &self.patterns {
            if pattern.is_match(text) {
                score += weight;
            }
        }
        score
    }

    /// Returns a candidate if the run reads as a heading near the top of
    /// the page.
    pub fn evaluate(&self, run: &TextRun, page: usize) -> Option<HeadingCandidate> {
        let text = run.text.trim();
        if text.chars().count() < self.config.min_heading_chars {
            return None;
        }

        let font_size = self.font_size(run);
        let score = self.score(text, font_size);
        let near_top = run.y() > self.config.near_top_threshold;

        if score >= self.config.score_threshold && near_top {
            Some(HeadingCandidate {
                title: text.to_string(),
                page,
                font_size,
            })
        } else {
            None
        }
    }

    /// Scans every page and keeps at most one candidate per page: the first
    /// qualifying run among the leading runs of its content stream.
    pub fn detect<D: DocumentSource + ?Sized>(&self, doc: &D) -> Vec<HeadingCandidate> {
        let mut candidates = Vec::new();

        for page in 1..=doc.page_count() {
            let runs = match doc.page_text_runs(page) {
                Ok(runs) => runs,
                Err(e) => {
                    warn!("Skipping page {} during heading scan: {}", page, e);
                    continue;
                }
            };

            let found = runs
                .iter()
                .take(self.config.max_runs_per_page)
                .find_map(|run| self.evaluate(run, page));

            if let Some(candidate) = found {
                debug!(
                    "Heading on page {}: '{}' ({:.1}pt)",
                    page, candidate.title, candidate.font_size
                );
                candidates.push(candidate);
            }
        }

        info!(
            "Heuristic scan found {} heading candidates in {} pages",
            candidates.len(),
            doc.page_count()
        );
        candidates
    }

    /// One single-page chapter per candidate, coded in detection order.
    pub fn candidates_to_chapters(candidates: Vec<HeadingCandidate>) -> Vec<Chapter> {
        candidates
            .into_iter()
            .enumerate()
            .map(|(idx, c)| Chapter {
                id: format!("rule-{}", idx),
                index_code: Some(format_index_code(&[idx + 1])),
                main_chapter_title: Some(c.title.clone()),
                title: c.title,
                start_page: c.page,
                end_page: c.page,
            })
            .collect()
    }

    /// Whole-document chapter used when nothing else was detected.
    pub fn fallback_chapter(total_pages: usize) -> Chapter {
        Chapter {
            id: "fallback-0".to_string(),
            title: "Document Core".to_string(),
            start_page: 1,
            end_page: total_pages,
            index_code: Some("01.00.00".to_string()),
            main_chapter_title: Some("Document".to_string()),
        }
    }
}
