//! # PDF Chapter Splitter Library
//!
//! Splits a PDF into one file per chapter and packs them into a zip archive.
//! Chapters come from the document's bookmarks when it has any, otherwise
//! from a font-size and text-pattern heading heuristic, and as a last resort
//! a single chapter spanning the whole document.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pdf_chapter_splitter::{Granularity, SplitSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = SplitSession::open("book.pdf").await?;
//!
//!     // Detect chapters and sections
//!     for chapter in session.detect(Granularity::Section).await? {
//!         println!("{} pages {}-{}", chapter.title, chapter.start_page, chapter.end_page);
//!     }
//!
//!     // Export and package
//!     let archive = session.split(None).await?.to_vec();
//!     let name = session.archive_name().unwrap_or_default();
//!     std::fs::write(name, archive)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod services;
pub mod types;

// Re-export main types and services for easier usage
pub use error::{ChapterSplitterError, Result};
pub use services::{
    ArchivePackager, ChapterDetector, ChapterExporter, DetectionReport, DocumentSource,
    OutputWriter, PageExtractor, PdfDocument, SourceLoader, SplitSession,
};
pub use types::{
    Chapter, ChapterUpdate, DetectionConfig, DetectionSource, ExportProgress, Granularity,
    SessionStatus, SplitConfig, SplitResult,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
