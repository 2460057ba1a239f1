use crate::error::{ChapterSplitterError, Result};
use crate::services::text_runs::{
    collect_text_runs, form_matrix, ContentResources, FontDecoder, FormXObject,
};
use crate::types::{Destination, OutlineNode, PageRef, TextRun};
use lopdf::content::Content;
use lopdf::{Dictionary, Object, ObjectId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Outline nesting deeper than this is treated as corrupt.
const MAX_OUTLINE_DEPTH: usize = 64;
const MAX_NAME_TREE_DEPTH: usize = 32;
const MAX_PARENT_HOPS: usize = 64;

/// Read access to a parsed document: pages, outline and positioned text.
pub trait DocumentSource {
    fn page_count(&self) -> usize;

    /// The bookmark tree, or `None` when the document has no outline.
    fn outline(&self) -> Option<Vec<OutlineNode>>;

    fn resolve_destination(&self, dest: &Destination) -> Option<PageRef>;

    /// Zero-based index of the referenced page.
    fn page_index_of(&self, page: PageRef) -> Option<usize>;

    /// Text runs of a 1-based page, in content-stream order.
    fn page_text_runs(&self, page_number: usize) -> Result<Vec<TextRun>>;
}

/// Copies pages out of a source document into new standalone documents.
pub trait PageExtractor {
    fn page_count(&self) -> usize;

    /// Builds a new document holding the given zero-based pages and
    /// serializes it. Indices must be strictly ascending; page order in the
    /// output always follows the source.
    fn extract_pages(&self, page_indices: &[usize]) -> Result<Vec<u8>>;
}

/// A PDF loaded into memory through lopdf.
pub struct PdfDocument {
    inner: lopdf::Document,
    page_ids: Vec<ObjectId>,
    page_index: HashMap<ObjectId, usize>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("page_count", &self.page_ids.len())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    pub fn load(name: &str, bytes: &[u8]) -> Result<Self> {
        let header_window = &bytes[..bytes.len().min(1024)];
        if !header_window.windows(5).any(|w| w == b"%PDF-") {
            return Err(ChapterSplitterError::InputFormat {
                path: name.to_string(),
                reason: "missing %PDF- header".to_string(),
            });
        }

        let inner = lopdf::Document::load_mem(bytes).map_err(|e| {
            ChapterSplitterError::InputFormat {
                path: name.to_string(),
                reason: format!("failed to parse PDF: {}", e),
            }
        })?;

        // get_pages is keyed by 1-based page number
        let page_ids: Vec<ObjectId> = inner.get_pages().values().copied().collect();
        if page_ids.is_empty() {
            return Err(ChapterSplitterError::InputFormat {
                path: name.to_string(),
                reason: "document has no pages".to_string(),
            });
        }

        let page_index = page_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect();

        debug!("Loaded '{}' with {} pages", name, page_ids.len());

        Ok(Self {
            inner,
            page_ids,
            page_index,
        })
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        let mut current = obj;
        for _ in 0..8 {
            match current {
                Object::Reference(id) => current = self.inner.get_object(*id).ok()?,
                other => return Some(other),
            }
        }
        None
    }

    fn resolve_dict<'a>(&'a self, obj: &'a Object) -> Option<&'a Dictionary> {
        self.resolve(obj)?.as_dict().ok()
    }

    fn catalog(&self) -> Option<&Dictionary> {
        let root = self.inner.trailer.get(b"Root").ok()?;
        self.resolve_dict(root)
    }

    fn read_outline_level(
        &self,
        first: ObjectId,
        depth: usize,
        visited: &mut HashSet<ObjectId>,
    ) -> Vec<OutlineNode> {
        let mut items = Vec::new();
        if depth >= MAX_OUTLINE_DEPTH {
            warn!("Outline nesting exceeds {} levels, truncating", MAX_OUTLINE_DEPTH);
            return items;
        }

        let mut current = Some(first);
        while let Some(node_id) = current {
            if !visited.insert(node_id) {
                warn!("Circular outline reference at {:?}", node_id);
                break;
            }

            let Some(node) = self.inner.get_object(node_id).and_then(Object::as_dict).ok() else {
                break;
            };

            let title = node
                .get(b"Title")
                .ok()
                .and_then(|t| self.resolve(t))
                .and_then(decode_text_object)
                .unwrap_or_default();

            let children = match node.get(b"First").and_then(Object::as_reference) {
                Ok(child) => self.read_outline_level(child, depth + 1, visited),
                Err(_) => Vec::new(),
            };

            items.push(OutlineNode {
                title,
                dest: self.outline_destination(node),
                items: children,
            });

            current = node.get(b"Next").and_then(Object::as_reference).ok();
        }

        items
    }

    /// Reads `/Dest`, falling back to the `/D` entry of a GoTo action.
    fn outline_destination(&self, node: &Dictionary) -> Option<Destination> {
        if let Ok(dest) = node.get(b"Dest") {
            return self.parse_destination(dest);
        }

        let action = self.resolve_dict(node.get(b"A").ok()?)?;
        match action.get(b"S") {
            Ok(Object::Name(kind)) if kind.as_slice() == b"GoTo" => {
                self.parse_destination(action.get(b"D").ok()?)
            }
            _ => None,
        }
    }

    fn parse_destination(&self, obj: &Object) -> Option<Destination> {
        let target = self.resolve(obj)?;
        match target {
            Object::Array(arr) => match arr.first() {
                Some(Object::Reference(page_id)) => Some(Destination::Explicit((*page_id).into())),
                _ => None,
            },
            Object::Name(name) => Some(Destination::Named(
                String::from_utf8_lossy(name).into_owned(),
            )),
            Object::String(..) => decode_text_object(target).map(Destination::Named),
            Object::Dictionary(dict) => self.parse_destination(dict.get(b"D").ok()?),
            _ => None,
        }
    }

    /// Page reference held by a destination value (array or `/D` dictionary).
    fn destination_page(&self, value: &Object) -> Option<PageRef> {
        match self.resolve(value)? {
            Object::Array(arr) => match arr.first() {
                Some(Object::Reference(page_id)) => Some((*page_id).into()),
                _ => None,
            },
            Object::Dictionary(dict) => self.destination_page(dict.get(b"D").ok()?),
            _ => None,
        }
    }

    fn lookup_named_destination(&self, name: &str) -> Option<PageRef> {
        let catalog = self.catalog()?;

        let from_tree = catalog
            .get(b"Names")
            .ok()
            .and_then(|names| self.resolve_dict(names))
            .and_then(|names| self.resolve_dict(names.get(b"Dests").ok()?))
            .and_then(|tree| self.lookup_name_tree(tree, name, 0));
        if from_tree.is_some() {
            return from_tree;
        }

        let dests = self.resolve_dict(catalog.get(b"Dests").ok()?)?;
        self.destination_page(dests.get(name.as_bytes()).ok()?)
    }

    fn lookup_name_tree(&self, node: &Dictionary, name: &str, depth: usize) -> Option<PageRef> {
        if depth > MAX_NAME_TREE_DEPTH {
            return None;
        }

        if let Some(Object::Array(pairs)) = node.get(b"Names").ok().and_then(|n| self.resolve(n)) {
            for pair in pairs.chunks(2) {
                let [key, value] = pair else { continue };
                let key = self.resolve(key).and_then(decode_text_object);
                if key.as_deref() == Some(name) {
                    return self.destination_page(value);
                }
            }
        }

        if let Some(Object::Array(kids)) = node.get(b"Kids").ok().and_then(|k| self.resolve(k)) {
            for kid in kids {
                if let Some(kid) = self.resolve_dict(kid) {
                    if let Some(found) = self.lookup_name_tree(kid, name, depth + 1) {
                        return Some(found);
                    }
                }
            }
        }

        None
    }

    /// Looks up a page attribute, walking up `/Parent` links when the page
    /// inherits it.
    fn inherited_attribute(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = page_id;
        for _ in 0..MAX_PARENT_HOPS {
            let dict = self.inner.get_object(current).and_then(Object::as_dict).ok()?;
            if let Ok(value) = dict.get(key) {
                return Some(value);
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        }
        None
    }

    fn font_decoder<'a>(&'a self, font: &'a Dictionary) -> FontDecoder<'a> {
        let two_byte = matches!(font.get(b"Subtype").and_then(Object::as_name), Ok(b"Type0"));
        let encoding = match font.get_font_encoding(&self.inner) {
            Ok(encoding) => Some(encoding),
            Err(e) => {
                debug!("No usable encoding for font: {}", e);
                None
            }
        };
        FontDecoder::new(encoding, two_byte)
    }
}

/// Fonts and XObjects of one resource dictionary.
struct ResourceScope<'a> {
    doc: &'a PdfDocument,
    dict: Option<&'a Dictionary>,
    fonts: HashMap<Vec<u8>, FontDecoder<'a>>,
}

impl<'a> ResourceScope<'a> {
    fn new(doc: &'a PdfDocument, dict: Option<&'a Dictionary>) -> Self {
        let mut fonts = HashMap::new();
        let font_dict = dict.and_then(|d| doc.resolve_dict(d.get(b"Font").ok()?));
        for (name, value) in font_dict.into_iter().flat_map(Dictionary::iter) {
            if let Some(font) = doc.resolve_dict(value) {
                fonts.insert(name.clone(), doc.font_decoder(font));
            }
        }
        Self { doc, dict, fonts }
    }

    /// The page's own or inherited resources, topped up with fonts lopdf
    /// finds in ancestor resource objects.
    fn for_page(doc: &'a PdfDocument, page_id: ObjectId) -> Self {
        let dict = doc
            .inherited_attribute(page_id, b"Resources")
            .and_then(|r| doc.resolve_dict(r));
        let mut scope = Self::new(doc, dict);
        if let Ok(page_fonts) = doc.inner.get_page_fonts(page_id) {
            for (name, font) in page_fonts {
                scope
                    .fonts
                    .entry(name)
                    .or_insert_with(|| doc.font_decoder(font));
            }
        }
        scope
    }
}

impl ContentResources for ResourceScope<'_> {
    fn font(&self, name: &[u8]) -> Option<&FontDecoder<'_>> {
        self.fonts.get(name)
    }

    fn form(&self, name: &[u8]) -> Option<FormXObject<'_>> {
        let xobjects = self.doc.resolve_dict(self.dict?.get(b"XObject").ok()?)?;
        let stream = self
            .doc
            .resolve(xobjects.get(name).ok()?)?
            .as_stream()
            .ok()?;
        if !matches!(stream.dict.get(b"Subtype").and_then(Object::as_name), Ok(b"Form")) {
            return None;
        }

        let operations = match stream
            .get_plain_content()
            .and_then(|bytes| Content::decode(&bytes))
        {
            Ok(content) => content.operations,
            Err(e) => {
                warn!(
                    "Skipping form XObject /{}: {}",
                    String::from_utf8_lossy(name),
                    e
                );
                return None;
            }
        };

        // Forms without their own resources use the painting stream's
        let resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| self.doc.resolve_dict(r))
            .or(self.dict);
        let matrix = stream.dict.get(b"Matrix").ok().and_then(|m| self.doc.resolve(m));

        Some(FormXObject {
            matrix: form_matrix(matrix),
            operations,
            resources: Box::new(ResourceScope::new(self.doc, resources)),
        })
    }
}

impl DocumentSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn outline(&self) -> Option<Vec<OutlineNode>> {
        let catalog = self.catalog()?;
        let outlines = self.resolve_dict(catalog.get(b"Outlines").ok()?)?;
        let first = outlines.get(b"First").and_then(Object::as_reference).ok()?;

        let mut visited = HashSet::new();
        let items = self.read_outline_level(first, 0, &mut visited);
        if items.is_empty() {
            None
        } else {
            Some(items)
        }
    }

    fn resolve_destination(&self, dest: &Destination) -> Option<PageRef> {
        match dest {
            Destination::Explicit(page) => Some(*page),
            Destination::Named(name) => self.lookup_named_destination(name),
        }
    }

    fn page_index_of(&self, page: PageRef) -> Option<usize> {
        self.page_index
            .get(&(page.object, page.generation))
            .copied()
    }

    fn page_text_runs(&self, page_number: usize) -> Result<Vec<TextRun>> {
        let page_id = page_number
            .checked_sub(1)
            .and_then(|idx| self.page_ids.get(idx))
            .copied()
            .ok_or_else(|| ChapterSplitterError::Session {
                reason: format!(
                    "page {} is outside 1..={}",
                    page_number,
                    self.page_ids.len()
                ),
            })?;

        let content_bytes = self.inner.get_page_content(page_id).map_err(|e| {
            ChapterSplitterError::Anyhow(anyhow::anyhow!(
                "failed to read content of page {}: {}",
                page_number,
                e
            ))
        })?;
        let content = Content::decode(&content_bytes).map_err(|e| {
            ChapterSplitterError::Anyhow(anyhow::anyhow!(
                "failed to decode content of page {}: {}",
                page_number,
                e
            ))
        })?;

        let resources = ResourceScope::for_page(self, page_id);
        Ok(collect_text_runs(&content.operations, &resources))
    }
}

impl PageExtractor for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn extract_pages(&self, page_indices: &[usize]) -> Result<Vec<u8>> {
        let range_label = match (page_indices.first(), page_indices.last()) {
            (Some(first), Some(last)) => format!("pages {}-{}", first + 1, last + 1),
            _ => "no pages".to_string(),
        };

        if let Some(bad) = page_indices.iter().find(|&&idx| idx >= self.page_ids.len()) {
            return Err(ChapterSplitterError::Export {
                chapter: range_label,
                reason: format!("page index {} out of range", bad),
            });
        }
        if let Some(pair) = page_indices.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(ChapterSplitterError::Export {
                chapter: range_label,
                reason: format!(
                    "page indices must be strictly ascending, got {} then {}",
                    pair[0], pair[1]
                ),
            });
        }

        let keep: HashSet<usize> = page_indices.iter().copied().collect();
        let to_delete: Vec<u32> = (0..self.page_ids.len())
            .filter(|idx| !keep.contains(idx))
            .map(|idx| idx as u32 + 1)
            .collect();

        let mut doc = self.inner.clone();
        doc.delete_pages(&to_delete);

        // Bookmarks and named destinations point into the full document
        if let Ok(root_id) = doc.trailer.get(b"Root").and_then(Object::as_reference) {
            if let Ok(catalog) = doc.get_object_mut(root_id).and_then(Object::as_dict_mut) {
                catalog.remove(b"Outlines");
                catalog.remove(b"Dests");
            }
        }

        doc.prune_objects();
        doc.renumber_objects();
        doc.compress();

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| ChapterSplitterError::Export {
                chapter: range_label,
                reason: format!("save failed: {}", e),
            })?;

        Ok(buffer)
    }
}

/// Decodes a PDF text string object: UTF-16BE or UTF-8 behind a BOM,
/// PDFDocEncoding otherwise. Malformed Unicode is decoded lossily.
pub(crate) fn decode_text_object(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };
    let text = match lopdf::decode_text_string(obj) {
        Ok(text) => text,
        Err(e) => {
            debug!("Lossy text string decode: {}", e);
            match bytes.strip_prefix(&[0xFE_u8, 0xFF]) {
                Some(utf16) => {
                    let units: Vec<u16> = utf16
                        .chunks(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
                        .collect();
                    String::from_utf16_lossy(&units)
                }
                None => String::from_utf8_lossy(bytes).into_owned(),
            }
        }
    };
    // lopdf keeps the UTF-8 byte order mark
    Some(text.trim_start_matches('\u{FEFF}').to_string())
}
