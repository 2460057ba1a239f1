pub mod archive;
pub mod detector;
pub mod document;
pub mod exporter;
pub mod heuristic;
pub mod loader;
pub mod naming;
pub mod normalizer;
pub mod outline;
pub mod output;
pub mod session;
mod text_runs;

#[cfg(test)]
pub(crate) mod fixtures;

pub use archive::ArchivePackager;
pub use detector::{ChapterDetector, Detection, DetectionReport};
pub use document::{DocumentSource, PageExtractor, PdfDocument};
pub use exporter::ChapterExporter;
pub use heuristic::HeadingDetector;
pub use loader::SourceLoader;
pub use normalizer::RangeNormalizer;
pub use outline::OutlineFlattener;
pub use output::{ChapterManifest, OutputWriter};
pub use session::SplitSession;
