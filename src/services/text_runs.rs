//! Content-stream interpretation for positioned text runs.
//!
//! Only the operators that move or show text are tracked, plus `Do` for
//! form XObjects. Glyph widths are not read from font programs; the advance
//! after a string is estimated from the font size, which is enough to order
//! runs on a line but not to lay them out exactly.

use crate::services::document::decode_text_object;
use crate::types::TextRun;
use lopdf::content::Operation;
use lopdf::{Document, Encoding, Object, StringFormat};
use std::collections::HashMap;
use tracing::debug;

/// Estimated glyph advance as a fraction of the font size.
const AVERAGE_GLYPH_WIDTH: f64 = 0.5;

/// `TJ` adjustments below this (in thousandths of an em) read as a word gap.
const WORD_GAP_ADJUSTMENT: f64 = -250.0;

const MAX_FORM_DEPTH: usize = 8;

/// Turns the string operands shown with one font into text.
pub(crate) struct FontDecoder<'a> {
    encoding: Option<Encoding<'a>>,
    two_byte: bool,
}

impl<'a> FontDecoder<'a> {
    /// `two_byte` marks composite (Type0) fonts, whose codes are two bytes
    /// wide when no encoding could be read.
    pub(crate) fn new(encoding: Option<Encoding<'a>>, two_byte: bool) -> Self {
        Self { encoding, two_byte }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        if let Some(encoding) = &self.encoding {
            match Document::decode_text(encoding, bytes) {
                Ok(text) => return text,
                Err(e) => debug!("Cannot decode with {:?}: {}", encoding, e),
            }
        }
        decode_unencoded(bytes, self.two_byte)
    }

    fn glyph_count(&self, bytes: &[u8]) -> usize {
        if self.two_byte {
            bytes.len() / 2
        } else {
            bytes.len()
        }
    }
}

/// Text shown without a usable font encoding: UTF-16BE for composite fonts,
/// otherwise a PDF text string.
fn decode_unencoded(bytes: &[u8], two_byte: bool) -> String {
    let raw = if two_byte && !bytes.starts_with(&[0xFE, 0xFF]) {
        [&[0xFE_u8, 0xFF][..], bytes].concat()
    } else {
        bytes.to_vec()
    };
    decode_text_object(&Object::String(raw, StringFormat::Literal)).unwrap_or_default()
}

/// Named resources visible to a content stream.
pub(crate) trait ContentResources {
    fn font(&self, name: &[u8]) -> Option<&FontDecoder<'_>>;

    /// The form painted by `Do name`; `None` for images and unknown names.
    fn form(&self, name: &[u8]) -> Option<FormXObject<'_>>;
}

/// A form XObject ready to be interpreted in place.
pub(crate) struct FormXObject<'a> {
    pub(crate) matrix: [f64; 6],
    pub(crate) operations: Vec<Operation>,
    pub(crate) resources: Box<dyn ContentResources + 'a>,
}

impl ContentResources for HashMap<Vec<u8>, FontDecoder<'_>> {
    fn font(&self, name: &[u8]) -> Option<&FontDecoder<'_>> {
        self.get(name)
    }

    fn form(&self, _name: &[u8]) -> Option<FormXObject<'_>> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translation(tx: f64, ty: f64) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other` in PDF row-vector convention.
    fn multiply(&self, other: &Matrix) -> Matrix {
        let [a0, a1, a2, a3, a4, a5] = self.0;
        let [b0, b1, b2, b3, b4, b5] = other.0;
        Matrix([
            a0 * b0 + a1 * b2,
            a0 * b1 + a1 * b3,
            a2 * b0 + a3 * b2,
            a2 * b1 + a3 * b3,
            a4 * b0 + a5 * b2 + b4,
            a4 * b1 + a5 * b3 + b5,
        ])
    }
}

/// Graphics state entries that affect text placement.
#[derive(Debug, Clone)]
struct TextState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scaling: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

struct TextRunCollector {
    state: TextState,
    stack: Vec<TextState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    runs: Vec<TextRun>,
}

impl TextRunCollector {
    fn new() -> Self {
        Self {
            state: TextState::default(),
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            runs: Vec::new(),
        }
    }

    fn run(&mut self, operations: &[Operation], resources: &dyn ContentResources, depth: usize) {
        for op in operations {
            self.apply(op, resources, depth);
        }
    }

    fn apply(&mut self, op: &Operation, resources: &dyn ContentResources, depth: usize) {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => match self.stack.pop() {
                Some(saved) => self.state = saved,
                None => debug!("Unbalanced Q operator"),
            },
            "cm" => {
                if let Some(m) = matrix_operand(operands) {
                    self.state.ctm = m.multiply(&self.state.ctm);
                }
            }
            "Do" => self.paint_form(operands, resources, depth),
            "BT" | "ET" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.state.font = Some(name.clone());
                }
                if let Some(size) = number_at(operands, 1) {
                    self.state.font_size = size;
                }
            }
            "Tc" => self.state.char_spacing = number_at(operands, 0).unwrap_or(0.0),
            "Tw" => self.state.word_spacing = number_at(operands, 0).unwrap_or(0.0),
            "Tz" => {
                self.state.horizontal_scaling = number_at(operands, 0).unwrap_or(100.0) / 100.0
            }
            "TL" => self.state.leading = number_at(operands, 0).unwrap_or(0.0),
            "Ts" => self.state.rise = number_at(operands, 0).unwrap_or(0.0),
            "Tm" => {
                if let Some(m) = matrix_operand(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (number_at(operands, 0), number_at(operands, 1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (number_at(operands, 0), number_at(operands, 1)) {
                    self.state.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes, resources);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes, resources);
                }
            }
            "\"" => {
                if let Some(aw) = number_at(operands, 0) {
                    self.state.word_spacing = aw;
                }
                if let Some(ac) = number_at(operands, 1) {
                    self.state.char_spacing = ac;
                }
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes, resources);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    self.show_array(items, resources);
                }
            }
            _ => {}
        }
    }

    /// Interprets a form XObject with the current state; nothing it changes
    /// survives the `Do`.
    fn paint_form(&mut self, operands: &[Object], resources: &dyn ContentResources, depth: usize) {
        let Some(Object::Name(name)) = operands.first() else {
            return;
        };
        if depth >= MAX_FORM_DEPTH {
            debug!("Form XObject nesting exceeds {} levels, skipping", MAX_FORM_DEPTH);
            return;
        }
        let Some(form) = resources.form(name) else {
            return;
        };

        let saved_state = self.state.clone();
        let saved_stack = self.stack.len();
        let (text_matrix, line_matrix) = (self.text_matrix, self.line_matrix);

        self.state.ctm = Matrix(form.matrix).multiply(&self.state.ctm);
        self.run(&form.operations, &*form.resources, depth + 1);

        self.stack.truncate(saved_stack);
        self.state = saved_state;
        self.text_matrix = text_matrix;
        self.line_matrix = line_matrix;
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translation(tx, ty).multiply(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_line(0.0, -leading);
    }

    fn current_font<'r>(&self, resources: &'r dyn ContentResources) -> Option<&'r FontDecoder<'r>> {
        self.state
            .font
            .as_deref()
            .and_then(|name| resources.font(name))
    }

    fn decode(&self, bytes: &[u8], resources: &dyn ContentResources) -> String {
        match self.current_font(resources) {
            Some(font) => font.decode(bytes),
            None => decode_unencoded(bytes, false),
        }
    }

    fn rendering_matrix(&self) -> Matrix {
        let s = &self.state;
        Matrix([
            s.font_size * s.horizontal_scaling,
            0.0,
            0.0,
            s.font_size,
            0.0,
            s.rise,
        ])
        .multiply(&self.text_matrix)
        .multiply(&s.ctm)
    }

    fn push_run(&mut self, text: String, origin: Matrix) {
        let [_, _, c, d, _, _] = origin.0;
        self.runs.push(TextRun {
            text,
            transform: origin.0,
            height: c.hypot(d),
        });
    }

    fn show(&mut self, bytes: &[u8], resources: &dyn ContentResources) {
        let origin = self.rendering_matrix();
        let text = self.decode(bytes, resources);
        self.push_run(text, origin);
        self.advance(bytes, resources);
    }

    fn show_array(&mut self, items: &[Object], resources: &dyn ContentResources) {
        let origin = self.rendering_matrix();
        let mut text = String::new();
        for item in items {
            match item {
                Object::String(bytes, _) => {
                    text.push_str(&self.decode(bytes, resources));
                    self.advance(bytes, resources);
                }
                other => {
                    if let Some(adjust) = number(other) {
                        if adjust < WORD_GAP_ADJUSTMENT && !text.ends_with(' ') {
                            text.push(' ');
                        }
                        let tx = -adjust / 1000.0
                            * self.state.font_size
                            * self.state.horizontal_scaling;
                        self.text_matrix = Matrix::translation(tx, 0.0).multiply(&self.text_matrix);
                    }
                }
            }
        }
        self.push_run(text, origin);
    }

    fn advance(&mut self, bytes: &[u8], resources: &dyn ContentResources) {
        let (glyphs, spaces) = match self.current_font(resources) {
            Some(font) if font.two_byte => (font.glyph_count(bytes), 0),
            _ => (bytes.len(), bytes.iter().filter(|&&b| b == b' ').count()),
        };
        let s = &self.state;
        let tx = (glyphs as f64 * (s.font_size * AVERAGE_GLYPH_WIDTH + s.char_spacing)
            + spaces as f64 * s.word_spacing)
            * s.horizontal_scaling;
        self.text_matrix = Matrix::translation(tx, 0.0).multiply(&self.text_matrix);
    }
}

pub(crate) fn collect_text_runs(
    operations: &[Operation],
    resources: &dyn ContentResources,
) -> Vec<TextRun> {
    let mut collector = TextRunCollector::new();
    collector.run(operations, resources, 0);
    collector.runs
}

/// A form's `/Matrix`, identity when absent or malformed.
pub(crate) fn form_matrix(value: Option<&Object>) -> [f64; 6] {
    match value {
        Some(Object::Array(items)) => matrix_operand(items).unwrap_or(Matrix::IDENTITY).0,
        _ => Matrix::IDENTITY.0,
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn number_at(operands: &[Object], idx: usize) -> Option<f64> {
    operands.get(idx).and_then(number)
}

fn matrix_operand(operands: &[Object]) -> Option<Matrix> {
    if operands.len() != 6 {
        return None;
    }
    let mut m = [0.0; 6];
    for (slot, obj) in m.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    Some(Matrix(m))
}
