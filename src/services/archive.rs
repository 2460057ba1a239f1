use crate::error::Result;
use crate::types::ExportedChapter;
use std::io::{Cursor, Write};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Collects named entries and packs them into a flat, deflated zip.
///
/// Adding a name twice keeps the entry at its first position with the
/// bytes of the last addition.
#[derive(Debug, Default)]
pub struct ArchivePackager {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchivePackager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: &str, bytes: Vec<u8>) {
        match self.entries.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => {
                warn!("Archive entry '{}' added twice, keeping the latest bytes", name);
                entry.1 = bytes;
            }
            None => self.entries.push((name.to_string(), bytes)),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finalize(self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, bytes) in &self.entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        let cursor = zip.finish()?;
        let archive = cursor.into_inner();
        debug!(
            "Packed {} entries into {} bytes",
            self.entries.len(),
            archive.len()
        );
        Ok(archive)
    }

    /// Packs exported chapters in order.
    pub fn package(chapters: &[ExportedChapter]) -> Result<Vec<u8>> {
        let mut packager = Self::new();
        for chapter in chapters {
            packager.put(&chapter.file_name, chapter.bytes.clone());
        }
        packager.finalize()
    }
}
