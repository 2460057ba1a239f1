use crate::error::ChapterSplitterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A contiguous, page-bounded partition of the source document.
///
/// Pages are 1-indexed and inclusive. After normalization
/// `1 <= start_page <= end_page <= total_pages` holds for every chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub start_page: usize,
    pub end_page: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_chapter_title: Option<String>,
}

impl Chapter {
    pub fn page_count(&self) -> usize {
        (self.end_page + 1).saturating_sub(self.start_page)
    }
}

/// Partial edit applied to a chapter during review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterUpdate {
    pub title: Option<String>,
    pub start_page: Option<usize>,
    pub end_page: Option<usize>,
}

/// Outline depth limit, and the number of index-code segments kept in
/// exported file names.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Granularity {
    #[default]
    Chapter = 1,
    Section = 2,
    Subsection = 3,
}

impl Granularity {
    pub fn depth(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Granularity {
    type Error = ChapterSplitterError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Granularity::Chapter),
            2 => Ok(Granularity::Section),
            3 => Ok(Granularity::Subsection),
            _ => Err(ChapterSplitterError::InvalidGranularity { value }),
        }
    }
}

impl From<Granularity> for u8 {
    fn from(g: Granularity) -> Self {
        g as u8
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Reference to a page object inside the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub object: u32,
    pub generation: u16,
}

impl From<(u32, u16)> for PageRef {
    fn from((object, generation): (u32, u16)) -> Self {
        Self { object, generation }
    }
}

/// Opaque outline target, resolved to a page through the document source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Key into the document's named-destination table.
    Named(String),
    /// Explicit destination whose first element is a page reference.
    Explicit(PageRef),
}

/// Read-only view of one bookmark and its children.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineNode {
    pub title: String,
    pub dest: Option<Destination>,
    pub items: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn new(title: impl Into<String>, dest: Option<Destination>) -> Self {
        Self {
            title: title.into(),
            dest,
            items: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<OutlineNode>) -> Self {
        self.items = items;
        self
    }
}

/// A positioned run of text as produced by one text-showing operation.
///
/// `transform` is the text rendering matrix `[a, b, c, d, e, f]` in the
/// page's coordinate space (origin bottom-left).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub transform: [f64; 6],
    pub height: f64,
}

impl TextRun {
    pub fn y(&self) -> f64 {
        self.transform[5]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadingCandidate {
    pub title: String,
    pub page: usize,
    pub font_size: f64,
}

/// Which detection track produced a chapter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionSource {
    Outline,
    Heuristic,
    Fallback,
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionSource::Outline => "bookmarks",
            DetectionSource::Heuristic => "heuristic",
            DetectionSource::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// A text pattern that adds `weight` to a run's heading score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingPattern {
    pub pattern: String,
    pub weight: i32,
}

impl HeadingPattern {
    pub fn new(pattern: &str, weight: i32) -> Self {
        Self {
            pattern: pattern.to_string(),
            weight,
        }
    }
}

/// Tunables for the heuristic heading detector.
///
/// A run becomes a heading when its score reaches `score_threshold` and its
/// baseline sits above `near_top_threshold` (page space, origin bottom-left).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub max_runs_per_page: usize,
    pub min_heading_chars: usize,
    pub score_threshold: i32,
    pub near_top_threshold: f64,
    /// Font sizes above this score +5.
    pub large_font_size: f64,
    /// Font sizes above this score a further +10.
    pub huge_font_size: f64,
    pub default_font_size: f64,
    pub patterns: Vec<HeadingPattern>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_runs_per_page: 15,
            min_heading_chars: 3,
            score_threshold: 10,
            near_top_threshold: 400.0,
            large_font_size: 16.0,
            huge_font_size: 20.0,
            default_font_size: 10.0,
            patterns: vec![
                HeadingPattern::new(r"(?i)^Chapter\s+\d+", 10),
                HeadingPattern::new(r"^\d+(\.\d+)?(\.\d+)?\s+[A-Z]", 8),
                HeadingPattern::new(r"(?i)^Section\s+\d+", 5),
            ],
        }
    }
}

/// Where a source document came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub loaded_at: String,
}

#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub granularity: Granularity,
    pub output_dir: PathBuf,
    pub include_metadata: bool,
    pub force: bool,
}

/// Progress event emitted after every exported or skipped chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportProgress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExportedChapter {
    pub chapter_id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SplitResult {
    pub archive_path: PathBuf,
    pub archive_size: usize,
    pub exported_files: Vec<String>,
    pub skipped_chapters: usize,
    pub metadata_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Staged,
    Analyzing,
    Reviewing,
    Splitting,
    Completed,
    Error(String),
}
