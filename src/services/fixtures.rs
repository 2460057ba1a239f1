//! Test-only document builders: an in-memory mock of the document traits
//! and a lopdf writer producing genuine PDFs.

use crate::error::{ChapterSplitterError, Result};
use crate::services::document::{DocumentSource, PageExtractor};
use crate::types::{Destination, OutlineNode, PageRef, TextRun};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub(crate) fn run(text: &str, font_size: f64, y: f64) -> TextRun {
    TextRun {
        text: text.to_string(),
        transform: [font_size, 0.0, 0.0, font_size, 72.0, y],
        height: font_size,
    }
}

#[derive(Default)]
pub(crate) struct MockDocument {
    pub pages: usize,
    pub outline: Option<Vec<OutlineNode>>,
    pub named: HashMap<String, PageRef>,
    pub runs: HashMap<usize, Vec<TextRun>>,
    pub unreadable_pages: HashSet<usize>,
    pub fail_extract_at: Option<usize>,
    pub extract_calls: Mutex<Vec<Vec<usize>>>,
}

impl MockDocument {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    /// Page reference of a 1-based page.
    pub fn page_ref(page_number: usize) -> PageRef {
        PageRef {
            object: 100 + page_number as u32 - 1,
            generation: 0,
        }
    }

    pub fn explicit(page_number: usize) -> Option<Destination> {
        Some(Destination::Explicit(Self::page_ref(page_number)))
    }

    pub fn with_outline(mut self, outline: Vec<OutlineNode>) -> Self {
        self.outline = Some(outline);
        self
    }

    pub fn with_named(mut self, name: &str, page_number: usize) -> Self {
        self.named.insert(name.to_string(), Self::page_ref(page_number));
        self
    }

    pub fn with_runs(mut self, page_number: usize, runs: Vec<TextRun>) -> Self {
        self.runs.insert(page_number, runs);
        self
    }

    pub fn extract_calls(&self) -> Vec<Vec<usize>> {
        self.extract_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl DocumentSource for MockDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn outline(&self) -> Option<Vec<OutlineNode>> {
        self.outline.clone()
    }

    fn resolve_destination(&self, dest: &Destination) -> Option<PageRef> {
        match dest {
            Destination::Explicit(page) => Some(*page),
            Destination::Named(name) => self.named.get(name).copied(),
        }
    }

    fn page_index_of(&self, page: PageRef) -> Option<usize> {
        let idx = page.object.checked_sub(100)? as usize;
        (idx < self.pages).then_some(idx)
    }

    fn page_text_runs(&self, page_number: usize) -> Result<Vec<TextRun>> {
        if self.unreadable_pages.contains(&page_number) {
            return Err(ChapterSplitterError::Anyhow(anyhow::anyhow!(
                "corrupt content stream on page {}",
                page_number
            )));
        }
        Ok(self.runs.get(&page_number).cloned().unwrap_or_default())
    }
}

impl PageExtractor for MockDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn extract_pages(&self, page_indices: &[usize]) -> Result<Vec<u8>> {
        let mut calls = self.extract_calls.lock().expect("extract_calls lock");
        calls.push(page_indices.to_vec());
        if self.fail_extract_at == Some(calls.len() - 1) {
            return Err(ChapterSplitterError::Export {
                chapter: "mock".to_string(),
                reason: "serialization failed".to_string(),
            });
        }
        Ok(format!("pages:{:?}", page_indices).into_bytes())
    }
}

/// Outline entry for [`PdfFixture`]; pages are 1-based.
pub(crate) struct FixtureOutline {
    title: Vec<u8>,
    target: FixtureTarget,
    children: Vec<FixtureOutline>,
}

enum FixtureTarget {
    Page(usize),
    Named(String, usize),
    None,
}

impl FixtureOutline {
    pub fn page(title: &str, page: usize) -> Self {
        Self {
            title: title.as_bytes().to_vec(),
            target: FixtureTarget::Page(page),
            children: Vec::new(),
        }
    }

    pub fn named(title: &str, name: &str, page: usize) -> Self {
        Self {
            title: title.as_bytes().to_vec(),
            target: FixtureTarget::Named(name.to_string(), page),
            children: Vec::new(),
        }
    }

    pub fn dangling(title: &str) -> Self {
        Self {
            title: title.as_bytes().to_vec(),
            target: FixtureTarget::None,
            children: Vec::new(),
        }
    }

    /// Title written as raw string bytes, for non-ASCII encodings.
    pub fn encoded(title: &[u8], page: usize) -> Self {
        Self {
            title: title.to_vec(),
            target: FixtureTarget::Page(page),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<FixtureOutline>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Clone, Copy, PartialEq)]
enum HeadingStyle {
    /// Simple WinAnsi font `F1`.
    Simple,
    /// Type0 font `F2` with Identity-H glyph codes and a ToUnicode CMap.
    Composite,
    /// `F1` text inside a form XObject shifted up by [`FORM_OFFSET`].
    Form,
}

struct FixtureHeading {
    text: String,
    font_size: f64,
    y: f64,
    style: HeadingStyle,
}

const FORM_OFFSET: f64 = 100.0;

/// Builds a real PDF: every page carries a small "Page N" line near the
/// bottom, plus any headings added with [`PdfFixture::heading`] and friends.
pub(crate) struct PdfFixture {
    pages: usize,
    headings: HashMap<usize, Vec<FixtureHeading>>,
    outline: Vec<FixtureOutline>,
}

impl PdfFixture {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            headings: HashMap::new(),
            outline: Vec::new(),
        }
    }

    pub fn heading(self, page: usize, text: &str, font_size: f64, y: f64) -> Self {
        self.styled(page, text, font_size, y, HeadingStyle::Simple)
    }

    /// Heading shown as two-byte glyph ids that only the font's ToUnicode
    /// map turns back into text.
    pub fn composite_heading(self, page: usize, text: &str, font_size: f64, y: f64) -> Self {
        self.styled(page, text, font_size, y, HeadingStyle::Composite)
    }

    /// Heading drawn by a form XObject; `y` is where it lands on the page.
    pub fn form_heading(self, page: usize, text: &str, font_size: f64, y: f64) -> Self {
        self.styled(page, text, font_size, y, HeadingStyle::Form)
    }

    fn styled(mut self, page: usize, text: &str, font_size: f64, y: f64, style: HeadingStyle) -> Self {
        self.headings.entry(page).or_default().push(FixtureHeading {
            text: text.to_string(),
            font_size,
            y,
            style,
        });
        self
    }

    /// Glyph id of every character shown with the composite font.
    fn glyph_ids(&self) -> Vec<char> {
        let mut chars: Vec<char> = self
            .headings
            .values()
            .flatten()
            .filter(|h| h.style == HeadingStyle::Composite)
            .flat_map(|h| h.text.chars())
            .collect();
        chars.sort_unstable();
        chars.dedup();
        chars
    }

    pub fn outline(mut self, outline: Vec<FixtureOutline>) -> Self {
        self.outline = outline;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
            ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
        ]));
        let mut fonts = Dictionary::from_iter(vec![("F1", Object::Reference(font_id))]);

        let glyphs = self.glyph_ids();
        if !glyphs.is_empty() {
            let composite_id = add_composite_font(&mut doc, &glyphs);
            fonts.set("F2", Object::Reference(composite_id));
        }
        let resources = Dictionary::from_iter(vec![("Font", Object::Dictionary(fonts))]);

        let mut page_ids = Vec::new();
        for page in 1..=self.pages {
            let mut operations = Vec::new();
            let mut forms = Dictionary::new();
            for heading in self.headings.get(&page).into_iter().flatten() {
                match heading.style {
                    HeadingStyle::Simple => push_text(
                        &mut operations,
                        b"F1",
                        heading.text.as_bytes().to_vec(),
                        heading.font_size,
                        heading.y,
                    ),
                    HeadingStyle::Composite => push_text(
                        &mut operations,
                        b"F2",
                        glyph_codes(&glyphs, &heading.text),
                        heading.font_size,
                        heading.y,
                    ),
                    HeadingStyle::Form => {
                        let name = format!("Fm{}", forms.len() + 1);
                        let form_id = add_form(&mut doc, &resources, heading);
                        forms.set(name.as_bytes().to_vec(), Object::Reference(form_id));
                        operations.push(Operation::new("q", vec![]));
                        operations.push(Operation::new(
                            "Do",
                            vec![Object::Name(name.into_bytes())],
                        ));
                        operations.push(Operation::new("Q", vec![]));
                    }
                }
            }
            push_text(
                &mut operations,
                b"F1",
                format!("Page {}", page).into_bytes(),
                12.0,
                60.0,
            );

            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(
                Dictionary::new(),
                content.encode().expect("encode content"),
            ));
            let mut page_dict = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(612),
                        Object::Integer(792),
                    ]),
                ),
                ("Contents", Object::Reference(content_id)),
            ]);
            if !forms.is_empty() {
                // a page's own resources replace the inherited ones
                let mut own = resources.clone();
                own.set("XObject", Object::Dictionary(forms));
                page_dict.set("Resources", Object::Dictionary(own));
            }
            page_ids.push(doc.add_object(page_dict));
        }

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(self.pages as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
            ("Resources", Object::Dictionary(resources)),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);

        if !self.outline.is_empty() {
            let outlines_id = doc.new_object_id();
            let mut names = Vec::new();
            let (first, last, count) =
                add_outline_level(&mut doc, outlines_id, &self.outline, &page_ids, &mut names);
            let outlines = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Outlines".to_vec())),
                ("First", Object::Reference(first)),
                ("Last", Object::Reference(last)),
                ("Count", Object::Integer(count)),
            ]);
            doc.objects.insert(outlines_id, Object::Dictionary(outlines));
            catalog.set("Outlines", Object::Reference(outlines_id));

            if !names.is_empty() {
                let dests = Dictionary::from_iter(vec![("Names", Object::Array(names))]);
                let dests_id = doc.add_object(dests);
                catalog.set(
                    "Names",
                    Object::Dictionary(Dictionary::from_iter(vec![(
                        "Dests",
                        Object::Reference(dests_id),
                    )])),
                );
            }
        }

        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("save fixture");
        buffer
    }
}

fn push_text(operations: &mut Vec<Operation>, font: &[u8], shown: Vec<u8>, size: f64, y: f64) {
    operations.push(Operation::new("BT", vec![]));
    operations.push(Operation::new(
        "Tf",
        vec![Object::Name(font.to_vec()), Object::Real(size as f32)],
    ));
    operations.push(Operation::new(
        "Tm",
        vec![
            Object::Integer(1),
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(1),
            Object::Integer(72),
            Object::Real(y as f32),
        ],
    ));
    operations.push(Operation::new(
        "Tj",
        vec![Object::String(shown, StringFormat::Hexadecimal)],
    ));
    operations.push(Operation::new("ET", vec![]));
}

/// Two-byte glyph ids; id N + 1 is the Nth entry of `glyphs`.
fn glyph_codes(glyphs: &[char], text: &str) -> Vec<u8> {
    text.chars()
        .filter_map(|c| glyphs.iter().position(|g| *g == c))
        .flat_map(|idx| (idx as u16 + 1).to_be_bytes())
        .collect()
}

/// Type0 font with an Identity-H encoding, a CID descendant and a ToUnicode
/// CMap covering `glyphs`.
fn add_composite_font(doc: &mut Document, glyphs: &[char]) -> ObjectId {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo\n\
         << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );
    cmap.push_str(&format!("{} beginbfchar\n", glyphs.len()));
    for (idx, c) in glyphs.iter().enumerate() {
        cmap.push_str(&format!("<{:04X}> <{:04X}>\n", idx + 1, *c as u32));
    }
    cmap.push_str(
        "endbfchar\n\
         endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end",
    );
    let to_unicode = doc.add_object(Stream::new(Dictionary::new(), cmap.into_bytes()));

    let descendant = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"CIDFontType2".to_vec())),
        ("BaseFont", Object::Name(b"NotoSans".to_vec())),
        (
            "CIDSystemInfo",
            Object::Dictionary(Dictionary::from_iter(vec![
                ("Registry", Object::String(b"Adobe".to_vec(), StringFormat::Literal)),
                ("Ordering", Object::String(b"Identity".to_vec(), StringFormat::Literal)),
                ("Supplement", Object::Integer(0)),
            ])),
        ),
    ]));

    doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type0".to_vec())),
        ("BaseFont", Object::Name(b"NotoSans".to_vec())),
        ("Encoding", Object::Name(b"Identity-H".to_vec())),
        ("DescendantFonts", Object::Array(vec![Object::Reference(descendant)])),
        ("ToUnicode", Object::Reference(to_unicode)),
    ]))
}

/// Form XObject showing `heading` [`FORM_OFFSET`] below its final position,
/// moved back up by the form matrix.
fn add_form(doc: &mut Document, resources: &Dictionary, heading: &FixtureHeading) -> ObjectId {
    let mut operations = Vec::new();
    push_text(
        &mut operations,
        b"F1",
        heading.text.as_bytes().to_vec(),
        heading.font_size,
        heading.y - FORM_OFFSET,
    );
    let content = Content { operations };
    let dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Form".to_vec())),
        (
            "BBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        ),
        (
            "Matrix",
            Object::Array(vec![
                Object::Integer(1),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(1),
                Object::Integer(0),
                Object::Real(FORM_OFFSET as f32),
            ]),
        ),
        ("Resources", Object::Dictionary(resources.clone())),
    ]);
    doc.add_object(Stream::new(dict, content.encode().expect("encode form")))
}

/// Writes one sibling level; returns (first, last, visible descendant count).
fn add_outline_level(
    doc: &mut Document,
    parent: ObjectId,
    items: &[FixtureOutline],
    page_ids: &[ObjectId],
    names: &mut Vec<Object>,
) -> (ObjectId, ObjectId, i64) {
    let ids: Vec<ObjectId> = items.iter().map(|_| doc.new_object_id()).collect();
    let mut count = ids.len() as i64;

    for (idx, item) in items.iter().enumerate() {
        let mut node = Dictionary::from_iter(vec![
            (
                "Title",
                Object::String(item.title.clone(), StringFormat::Literal),
            ),
            ("Parent", Object::Reference(parent)),
        ]);
        if idx > 0 {
            node.set("Prev", Object::Reference(ids[idx - 1]));
        }
        if let Some(next) = ids.get(idx + 1) {
            node.set("Next", Object::Reference(*next));
        }

        match &item.target {
            FixtureTarget::Page(page) => {
                node.set("Dest", explicit_dest(page_ids[page - 1]));
            }
            FixtureTarget::Named(name, page) => {
                node.set(
                    "Dest",
                    Object::String(name.as_bytes().to_vec(), StringFormat::Literal),
                );
                names.push(Object::String(name.as_bytes().to_vec(), StringFormat::Literal));
                names.push(explicit_dest(page_ids[page - 1]));
            }
            FixtureTarget::None => {}
        }

        if !item.children.is_empty() {
            let (first, last, child_count) =
                add_outline_level(doc, ids[idx], &item.children, page_ids, names);
            node.set("First", Object::Reference(first));
            node.set("Last", Object::Reference(last));
            node.set("Count", Object::Integer(child_count));
            count += child_count;
        }

        doc.objects.insert(ids[idx], Object::Dictionary(node));
    }

    (ids[0], ids[ids.len() - 1], count)
}

fn explicit_dest(page_id: ObjectId) -> Object {
    Object::Array(vec![
        Object::Reference(page_id),
        Object::Name(b"Fit".to_vec()),
    ])
}
