use crate::types::Chapter;
use tracing::debug;

/// Turns chapter start markers into a gapless partition of the page range.
pub struct RangeNormalizer;

impl RangeNormalizer {
    /// Sorts by start page (stable), pins the first chapter to page 1 and
    /// ends every chapter just before the next one starts. The last chapter
    /// runs to `total_pages`. Two chapters sharing a start page leave the
    /// earlier one as a single page instead of an inverted range.
    pub fn normalize(mut chapters: Vec<Chapter>, total_pages: usize) -> Vec<Chapter> {
        if chapters.is_empty() {
            return chapters;
        }

        chapters.sort_by_key(|c| c.start_page);
        chapters[0].start_page = 1;

        let next_starts: Vec<Option<usize>> = chapters
            .iter()
            .skip(1)
            .map(|c| Some(c.start_page))
            .chain(std::iter::once(None))
            .collect();

        for (chapter, next_start) in chapters.iter_mut().zip(next_starts) {
            chapter.end_page = match next_start {
                Some(start) => start.saturating_sub(1),
                None => total_pages,
            };
            if chapter.end_page < chapter.start_page {
                debug!(
                    "Clamping '{}' to a single page at {}",
                    chapter.title, chapter.start_page
                );
                chapter.end_page = chapter.start_page;
            }
        }

        chapters
    }
}
