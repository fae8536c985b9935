//! PDF reader built on `lopdf`.
//!
//! Walks each page's content stream once, tracking the graphics state
//! (`q`/`Q`/`cm`) and the text state (`BT`..`ET`), and reports:
//!
//! - text fragments with an estimated box (one per show-text operator),
//! - line segments from stroked or filled paths (candidate table rulings),
//! - image XObjects painted with `Do`, boxed by the current transform,
//! - link annotation URIs.
//!
//! Everything is converted to a top-left origin before it leaves this
//! module. Glyph widths are not read from font programs; a fragment is
//! assumed to be half an em per character wide.

use super::elements::{
    EmbeddedImage, LayoutDocument, LayoutPage, PlacedImage, Segment, TextFragment,
};
use super::LayoutReader;
use crate::error::{Error, Result};
use crate::model::BoundingBox;
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId, Stream};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Average glyph advance as a fraction of the font size.
const GLYPH_WIDTH_EM: f32 = 0.5;
/// Ascender and descender as fractions of the font size.
const ASCENT_EM: f32 = 0.8;
const DESCENT_EM: f32 = 0.2;

/// Reads `.pdf` files into positioned page elements.
#[derive(Debug, Clone, Default)]
pub struct PdfLayoutReader {
    _private: (),
}

impl PdfLayoutReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an already loaded document.
    pub fn read_document(&self, doc: &LopdfDocument) -> Result<LayoutDocument> {
        if doc.is_encrypted() {
            return Err(Error::SourceParse("PDF is encrypted".to_string()));
        }

        let mut layout = LayoutDocument::default();
        for (number, page_id) in doc.get_pages() {
            layout.pages.push(read_page(doc, number, page_id)?);
        }

        log::debug!("PdfLayoutReader: {} pages", layout.pages.len());
        Ok(layout)
    }
}

impl LayoutReader for PdfLayoutReader {
    fn read(&self, path: &Path) -> Result<LayoutDocument> {
        let doc = LopdfDocument::load(path)?;
        self.read_document(&doc)
    }
}

fn read_page(doc: &LopdfDocument, number: u32, page_id: ObjectId) -> Result<LayoutPage> {
    let page_dict = doc.get_dictionary(page_id)?;
    let media_box = media_box(doc, page_dict);

    let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
    let xobjects = page_xobjects(doc, page_dict);

    let ctx = PageContext {
        doc,
        fonts,
        xobjects,
        left: media_box.0,
        top: media_box.3,
    };

    let content = page_content(doc, page_dict)?;
    let operations = if content.is_empty() {
        Vec::new()
    } else {
        Content::decode(&content)?.operations
    };
    let scan = scan_operations(&ctx, &operations);

    log::debug!(
        "PdfLayoutReader: page {} has {} fragments, {} rulings, {} images ({} skipped)",
        number,
        scan.fragments.len(),
        scan.rulings.len(),
        scan.images.len(),
        scan.skipped_images.len()
    );

    Ok(LayoutPage {
        number,
        width: media_box.2 - media_box.0,
        height: media_box.3 - media_box.1,
        fragments: scan.fragments,
        links: page_links(doc, page_dict),
        rulings: scan.rulings,
        tables: Vec::new(),
        images: scan.images,
        skipped_images: scan.skipped_images,
    })
}

/// MediaBox as (llx, lly, urx, ury), Letter when absent.
fn media_box(doc: &LopdfDocument, page_dict: &Dictionary) -> (f32, f32, f32, f32) {
    let mut dict = Some(page_dict);
    let mut visited: HashSet<ObjectId> = HashSet::new();
    // MediaBox is inheritable through the page tree
    while let Some(d) = dict {
        if let Ok(array) = d.get(b"MediaBox").map(|o| resolve(doc, o)) {
            if let Ok(array) = array.as_array() {
                let values: Vec<f32> = array.iter().filter_map(|o| get_number(resolve(doc, o))).collect();
                if values.len() >= 4 {
                    return (values[0], values[1], values[2], values[3]);
                }
            }
        }
        dict = d
            .get(b"Parent")
            .ok()
            .and_then(|p| p.as_reference().ok())
            .filter(|id| visited.insert(*id))
            .and_then(|id| doc.get_dictionary(id).ok());
    }
    (0.0, 0.0, 612.0, 792.0)
}

fn page_content(doc: &LopdfDocument, page_dict: &Dictionary) -> Result<Vec<u8>> {
    let contents = match page_dict.get(b"Contents") {
        Ok(c) => c,
        Err(_) => return Ok(Vec::new()),
    };

    match resolve(doc, contents) {
        Object::Stream(s) => Ok(s.decompressed_content()?),
        Object::Array(arr) => {
            let mut content = Vec::new();
            for obj in arr {
                if let Object::Stream(s) = resolve(doc, obj) {
                    if let Ok(data) = s.decompressed_content() {
                        content.extend_from_slice(&data);
                        content.push(b' ');
                    }
                }
            }
            Ok(content)
        }
        _ => Err(Error::SourceParse("invalid page content stream".to_string())),
    }
}

fn page_xobjects(doc: &LopdfDocument, page_dict: &Dictionary) -> HashMap<Vec<u8>, ObjectId> {
    let mut xobjects = HashMap::new();
    let resources = page_dict
        .get(b"Resources")
        .ok()
        .and_then(|r| resolve(doc, r).as_dict().ok());
    let xobject_dict = resources
        .and_then(|r| r.get(b"XObject").ok())
        .and_then(|x| resolve(doc, x).as_dict().ok());

    if let Some(dict) = xobject_dict {
        for (name, obj) in dict.iter() {
            if let Ok(id) = obj.as_reference() {
                xobjects.insert(name.clone(), id);
            }
        }
    }
    xobjects
}

/// URIs of link annotations on the page.
fn page_links(doc: &LopdfDocument, page_dict: &Dictionary) -> Vec<String> {
    let annots = match page_dict.get(b"Annots").map(|a| resolve(doc, a)) {
        Ok(Object::Array(arr)) => arr,
        _ => return Vec::new(),
    };

    let mut links = Vec::new();
    for annot in annots {
        let Ok(annot) = resolve(doc, annot).as_dict() else {
            continue;
        };
        let is_link = annot
            .get(b"Subtype")
            .ok()
            .and_then(|s| s.as_name().ok())
            .map(|n| n == b"Link")
            .unwrap_or(false);
        if !is_link {
            continue;
        }
        let uri = annot
            .get(b"A")
            .ok()
            .and_then(|a| resolve(doc, a).as_dict().ok())
            .and_then(|a| a.get(b"URI").ok())
            .and_then(|u| match resolve(doc, u) {
                Object::String(bytes, _) => Some(decode_text_simple(bytes)),
                _ => None,
            });
        if let Some(uri) = uri.filter(|u| !u.trim().is_empty()) {
            links.push(uri);
        }
    }
    links
}

struct PageContext<'a> {
    doc: &'a LopdfDocument,
    fonts: BTreeMap<Vec<u8>, &'a Dictionary>,
    xobjects: HashMap<Vec<u8>, ObjectId>,
    /// MediaBox left edge
    left: f32,
    /// MediaBox top edge
    top: f32,
}

impl PageContext<'_> {
    fn to_top_left(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.left, self.top - y)
    }

    fn decode(&self, font: &[u8], bytes: &[u8]) -> String {
        let encoding = self
            .fonts
            .get(font)
            .and_then(|f| f.get_font_encoding(self.doc).ok());
        match encoding {
            Some(ref enc) => LopdfDocument::decode_text(enc, bytes).unwrap_or_default(),
            None => decode_text_simple(bytes),
        }
    }
}

#[derive(Debug, Default)]
struct Scan {
    fragments: Vec<TextFragment>,
    rulings: Vec<Segment>,
    images: Vec<PlacedImage>,
    skipped_images: Vec<String>,
}

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() < 6 {
            return None;
        }
        let v: Vec<f32> = operands.iter().take(6).filter_map(get_number).collect();
        if v.len() < 6 {
            return None;
        }
        Some(Matrix {
            a: v[0],
            b: v[1],
            c: v[2],
            d: v[3],
            e: v[4],
            f: v[5],
        })
    }

    fn translation(tx: f32, ty: f32) -> Matrix {
        Matrix {
            e: tx,
            f: ty,
            ..Matrix::IDENTITY
        }
    }

    /// `self × other`
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    fn vertical_scale(&self) -> f32 {
        (self.b * self.b + self.d * self.d).sqrt()
    }
}

struct TextState {
    matrix: Matrix,
    line_matrix: Matrix,
    font: Vec<u8>,
    size: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font: Vec::new(),
            size: 12.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translation(tx, ty).then(&self.line_matrix);
        self.matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = if self.leading != 0.0 {
            self.leading
        } else {
            self.size * 1.2
        };
        self.move_line(0.0, -leading);
    }
}

fn scan_operations(ctx: &PageContext<'_>, operations: &[Operation]) -> Scan {
    let mut scan = Scan::default();
    let mut ctm = Matrix::IDENTITY;
    let mut stack: Vec<Matrix> = Vec::new();
    let mut text = TextState::default();

    let mut path: Vec<Segment> = Vec::new();
    let mut current: Option<(f32, f32)> = None;
    let mut start: Option<(f32, f32)> = None;

    for op in operations {
        let operands = &op.operands;
        let num = |i: usize| operands.get(i).and_then(get_number);

        match op.operator.as_str() {
            "q" => stack.push(ctm),
            "Q" => ctm = stack.pop().unwrap_or(Matrix::IDENTITY),
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    ctm = m.then(&ctm);
                }
            }

            // Text state
            "BT" => {
                text.matrix = Matrix::IDENTITY;
                text.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(font)) = operands.first() {
                    text.font = font.clone();
                }
                text.size = num(1).unwrap_or(text.size);
            }
            "TL" => text.leading = num(0).unwrap_or(0.0),
            "Td" => text.move_line(num(0).unwrap_or(0.0), num(1).unwrap_or(0.0)),
            "TD" => {
                let ty = num(1).unwrap_or(0.0);
                text.leading = -ty;
                text.move_line(num(0).unwrap_or(0.0), ty);
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    text.matrix = m;
                    text.line_matrix = m;
                }
            }
            "T*" => text.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    let s = ctx.decode(&text.font, bytes);
                    show_text(ctx, &mut scan, &mut text, &ctm, s);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let s = decode_tj_array(ctx, &text.font, items);
                    show_text(ctx, &mut scan, &mut text, &ctm, s);
                }
            }
            "'" | "\"" => {
                text.next_line();
                let index = if op.operator == "\"" { 2 } else { 0 };
                if let Some(Object::String(bytes, _)) = operands.get(index) {
                    let s = ctx.decode(&text.font, bytes);
                    show_text(ctx, &mut scan, &mut text, &ctm, s);
                }
            }

            // Path construction
            "m" => {
                if let (Some(x), Some(y)) = (num(0), num(1)) {
                    let p = ctm.apply(x, y);
                    current = Some(p);
                    start = Some(p);
                }
            }
            "l" => {
                if let (Some(x), Some(y), Some(from)) = (num(0), num(1), current) {
                    let to = ctm.apply(x, y);
                    path.push(Segment::new(from.0, from.1, to.0, to.1));
                    current = Some(to);
                }
            }
            "c" | "v" | "y" => {
                let n = operands.len();
                if n >= 2 {
                    if let (Some(x), Some(y)) = (num(n - 2), num(n - 1)) {
                        current = Some(ctm.apply(x, y));
                    }
                }
            }
            "re" => {
                if let (Some(x), Some(y), Some(w), Some(h)) = (num(0), num(1), num(2), num(3)) {
                    let corners = [
                        ctm.apply(x, y),
                        ctm.apply(x + w, y),
                        ctm.apply(x + w, y + h),
                        ctm.apply(x, y + h),
                    ];
                    for i in 0..4 {
                        let (p, q) = (corners[i], corners[(i + 1) % 4]);
                        path.push(Segment::new(p.0, p.1, q.0, q.1));
                    }
                    current = Some(corners[0]);
                    start = Some(corners[0]);
                }
            }
            "h" => {
                if let (Some(from), Some(to)) = (current, start) {
                    if from != to {
                        path.push(Segment::new(from.0, from.1, to.0, to.1));
                    }
                    current = start;
                }
            }
            "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                for seg in path.drain(..) {
                    let (x0, y0) = ctx.to_top_left(seg.x0, seg.y0);
                    let (x1, y1) = ctx.to_top_left(seg.x1, seg.y1);
                    scan.rulings.push(Segment::new(x0, y0, x1, y1));
                }
                current = None;
                start = None;
            }
            "n" => {
                path.clear();
                current = None;
                start = None;
            }

            // XObjects
            "Do" => {
                if let Some(Object::Name(name)) = operands.first() {
                    match paint_xobject(ctx, name, &ctm) {
                        Some(Painted::Image(image)) => scan.images.push(image),
                        Some(Painted::Skipped(reason)) => scan.skipped_images.push(reason),
                        None => {}
                    }
                }
            }
            _ => {}
        }
    }

    scan
}

fn show_text(
    ctx: &PageContext<'_>,
    scan: &mut Scan,
    text: &mut TextState,
    ctm: &Matrix,
    s: String,
) {
    let chars = s.chars().count() as f32;
    let advance = chars * text.size * GLYPH_WIDTH_EM;

    if !s.trim().is_empty() {
        let render = text.matrix.then(ctm);
        let size = text.size * render.vertical_scale();
        let (x, y) = render.apply(0.0, 0.0);
        let (x_end, _) = render.apply(advance, 0.0);

        let (left, baseline) = ctx.to_top_left(x, y);
        let right = left + (x_end - x).abs();
        let bbox = BoundingBox::new(
            left,
            baseline - size * ASCENT_EM,
            right,
            baseline + size * DESCENT_EM,
        );
        let normalized: String = s.nfc().collect();
        scan.fragments.push(TextFragment::new(normalized, bbox, size));
    }

    text.matrix = Matrix::translation(advance, 0.0).then(&text.matrix);
}

/// Decode a `TJ` array, inserting a space for large negative kerning.
fn decode_tj_array(ctx: &PageContext<'_>, font: &[u8], items: &[Object]) -> String {
    // 200 thousandths of an em reads as a word gap in most fonts
    let space_threshold = 200.0;
    let mut combined = String::new();

    for item in items {
        match item {
            Object::String(bytes, _) => combined.push_str(&ctx.decode(font, bytes)),
            Object::Integer(_) | Object::Real(_) => {
                let adjustment = -get_number(item).unwrap_or(0.0);
                if adjustment > space_threshold
                    && !combined.is_empty()
                    && !combined.ends_with(' ')
                    && !combined.chars().last().map(is_spaceless_script_char).unwrap_or(false)
                {
                    combined.push(' ');
                }
            }
            _ => {}
        }
    }
    combined
}

/// Outcome of painting an image XObject.
enum Painted {
    Image(PlacedImage),
    /// Found but not decodable; carries the reason
    Skipped(String),
}

fn paint_xobject(ctx: &PageContext<'_>, name: &[u8], ctm: &Matrix) -> Option<Painted> {
    let id = ctx.xobjects.get(name)?;
    let stream = match ctx.doc.get_object(*id) {
        Ok(Object::Stream(stream)) => stream,
        _ => return None,
    };

    let subtype = stream.dict.get(b"Subtype").ok().and_then(|s| s.as_name().ok());
    if subtype != Some(b"Image".as_slice()) {
        log::debug!(
            "PdfLayoutReader: skipping non-image XObject {}",
            String::from_utf8_lossy(name)
        );
        return None;
    }

    let image = match extract_image(ctx.doc, stream) {
        Ok(image) => image,
        Err(reason) => {
            return Some(Painted::Skipped(format!(
                "image {}: {}",
                String::from_utf8_lossy(name),
                reason
            )))
        }
    };

    // Images are painted into the unit square
    let corners = [
        ctm.apply(0.0, 0.0),
        ctm.apply(1.0, 0.0),
        ctm.apply(0.0, 1.0),
        ctm.apply(1.0, 1.0),
    ];
    let mut bbox: Option<BoundingBox> = None;
    for (x, y) in corners {
        let (x, y) = ctx.to_top_left(x, y);
        let point = BoundingBox::new(x, y, x, y);
        bbox = Some(bbox.map(|b| b.union(&point)).unwrap_or(point));
    }

    Some(Painted::Image(PlacedImage { image, bbox }))
}

/// Pull encoded bytes out of an image XObject.
///
/// JPEG and JPEG 2000 streams are passed through. Raw samples (unfiltered,
/// Flate or LZW) in gray, RGB, CMYK or indexed color at 1 to 16 bits are
/// re-encoded as PNG; stencil masks decode as 1-bit gray. Anything else is
/// returned as an error naming what was not understood.
fn extract_image(doc: &LopdfDocument, stream: &Stream) -> std::result::Result<EmbeddedImage, String> {
    let dict = &stream.dict;
    let filters: Vec<Vec<u8>> = match dict.get(b"Filter").map(|f| resolve(doc, f)) {
        Ok(Object::Name(n)) => vec![n.clone()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| o.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    };

    match filters.last().map(|f| f.as_slice()) {
        Some(b"DCTDecode") if filters.len() == 1 => Ok(EmbeddedImage::new(
            stream.content.clone(),
            Some("jpg".to_string()),
        )),
        Some(b"JPXDecode") if filters.len() == 1 => Ok(EmbeddedImage::new(
            stream.content.clone(),
            Some("jp2".to_string()),
        )),
        None | Some(b"FlateDecode") | Some(b"LZWDecode") => {
            let dimension = |key: &[u8]| {
                dict.get(key)
                    .ok()
                    .and_then(|o| resolve(doc, o).as_i64().ok())
                    .filter(|v| *v > 0)
                    .map(|v| v as u32)
            };
            let (Some(width), Some(height)) = (dimension(b"Width"), dimension(b"Height")) else {
                return Err("missing or invalid dimensions".to_string());
            };

            let stencil = matches!(
                dict.get(b"ImageMask").map(|o| resolve(doc, o)),
                Ok(Object::Boolean(true))
            );
            let (bits, space) = if stencil {
                (1, ColorSpace::Gray)
            } else {
                let bits = dict
                    .get(b"BitsPerComponent")
                    .ok()
                    .and_then(|b| resolve(doc, b).as_i64().ok())
                    .unwrap_or(8);
                let space = match dict.get(b"ColorSpace") {
                    Ok(obj) => color_space(doc, obj)?,
                    Err(_) => return Err("no color space".to_string()),
                };
                (bits, space)
            };

            let samples = if filters.is_empty() {
                stream.content.clone()
            } else {
                stream
                    .decompressed_content()
                    .map_err(|e| format!("cannot decompress samples: {e}"))?
            };
            let image = decode_raw(width, height, bits, &space, &samples)?;
            encode_png(&image).map(|png| EmbeddedImage::new(png, Some("png".to_string())))
        }
        Some(other) => Err(format!(
            "unsupported filter {}",
            String::from_utf8_lossy(other)
        )),
    }
}

/// Color spaces an image can be decoded from.
#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// One index per pixel into `palette`, entries in `base`
    Indexed {
        base: Box<ColorSpace>,
        palette: Vec<u8>,
    },
}

impl ColorSpace {
    /// Samples per pixel in the image data.
    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }

    /// One palette entry or pixel as RGB.
    fn to_rgb(&self, entry: &[u8]) -> [u8; 3] {
        match (self, entry) {
            (ColorSpace::Gray, [g, ..]) => [*g, *g, *g],
            (ColorSpace::Rgb, [r, g, b, ..]) => [*r, *g, *b],
            (ColorSpace::Cmyk, [c, m, y, k, ..]) => {
                let channel = |v: u8| ((255 - v as u32) * (255 - *k as u32) / 255) as u8;
                [channel(*c), channel(*m), channel(*y)]
            }
            _ => [0, 0, 0],
        }
    }
}

fn color_space(doc: &LopdfDocument, obj: &Object) -> std::result::Result<ColorSpace, String> {
    match resolve(doc, obj) {
        Object::Name(n) => match n.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Ok(ColorSpace::Gray),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
            other => Err(format!(
                "unsupported color space {}",
                String::from_utf8_lossy(other)
            )),
        },
        Object::Array(arr) => {
            let family = arr
                .first()
                .and_then(|f| resolve(doc, f).as_name().ok())
                .ok_or("malformed color space")?;
            match family {
                b"CalGray" => Ok(ColorSpace::Gray),
                b"CalRGB" => Ok(ColorSpace::Rgb),
                b"ICCBased" => match arr.get(1).map(|o| resolve(doc, o)) {
                    Some(Object::Stream(icc)) => {
                        match icc.dict.get(b"N").ok().and_then(|n| n.as_i64().ok()) {
                            Some(1) => Ok(ColorSpace::Gray),
                            Some(3) => Ok(ColorSpace::Rgb),
                            Some(4) => Ok(ColorSpace::Cmyk),
                            n => Err(format!("ICC profile with {n:?} components")),
                        }
                    }
                    _ => Err("ICCBased color space without a profile".to_string()),
                },
                b"Indexed" | b"I" => {
                    let base = color_space(doc, arr.get(1).ok_or("Indexed without a base")?)?;
                    if matches!(base, ColorSpace::Indexed { .. }) {
                        return Err("nested Indexed color space".to_string());
                    }
                    let palette = match arr.get(3).map(|o| resolve(doc, o)) {
                        Some(Object::String(bytes, _)) => bytes.clone(),
                        Some(Object::Stream(lookup)) => lookup
                            .decompressed_content()
                            .unwrap_or_else(|_| lookup.content.clone()),
                        _ => return Err("Indexed without a lookup table".to_string()),
                    };
                    Ok(ColorSpace::Indexed {
                        base: Box::new(base),
                        palette,
                    })
                }
                other => Err(format!(
                    "unsupported color space {}",
                    String::from_utf8_lossy(other)
                )),
            }
        }
        _ => Err("malformed color space".to_string()),
    }
}

/// Unpack rows of `bits`-deep samples into one byte per sample.
///
/// Rows start on a byte boundary. Sub-byte samples are scaled to 0..=255
/// when `scale` is set (palette indices are not); 16-bit samples keep their
/// high byte.
fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    bits: i64,
    per_pixel: usize,
    scale: bool,
) -> std::result::Result<Vec<u8>, String> {
    if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
        return Err(format!("{bits} bits per component"));
    }
    let bits = bits as usize;
    let per_row = width as usize * per_pixel;
    let row_bytes = (per_row * bits).div_ceil(8);
    let height = height as usize;
    if data.len() < row_bytes * height {
        return Err(format!(
            "truncated samples ({} of {} bytes)",
            data.len(),
            row_bytes * height
        ));
    }

    let max = (1u32 << bits.min(8)) - 1;
    let mut out = Vec::with_capacity(per_row * height);
    for row in data.chunks(row_bytes).take(height) {
        for i in 0..per_row {
            let value = match bits {
                8 => row[i] as u32,
                16 => row[2 * i] as u32,
                _ => {
                    let bit = i * bits;
                    let shift = 8 - bits - bit % 8;
                    (row[bit / 8] as u32 >> shift) & max
                }
            };
            out.push(if scale && bits < 8 {
                (value * 255 / max) as u8
            } else {
                value as u8
            });
        }
    }
    Ok(out)
}

fn decode_raw(
    width: u32,
    height: u32,
    bits: i64,
    space: &ColorSpace,
    data: &[u8],
) -> std::result::Result<DynamicImage, String> {
    let indexed = matches!(space, ColorSpace::Indexed { .. });
    let samples = unpack_samples(data, width, height, bits, space.components(), !indexed)?;

    let image = match space {
        ColorSpace::Gray => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
        ColorSpace::Rgb => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
        ColorSpace::Cmyk => {
            let pixels = samples
                .chunks_exact(4)
                .flat_map(|p| space.to_rgb(p))
                .collect();
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        }
        ColorSpace::Indexed { base, palette } => {
            let n = base.components();
            let pixels = samples
                .iter()
                .flat_map(|&index| {
                    let start = index as usize * n;
                    palette
                        .get(start..start + n)
                        .map(|entry| base.to_rgb(entry))
                        .unwrap_or([0, 0, 0])
                })
                .collect();
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        }
    };
    image.ok_or_else(|| "sample count does not match the dimensions".to_string())
}

fn encode_png(image: &DynamicImage) -> std::result::Result<Vec<u8>, String> {
    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, image::ImageFormat::Png)
        .map_err(|e| format!("PNG encoding failed: {e}"))?;
    Ok(png.into_inner())
}

fn resolve<'a>(doc: &'a LopdfDocument, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Helper to extract number from PDF object.
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Chinese and Japanese scripts do not separate words with spaces.
pub(crate) fn is_spaceless_script_char(c: char) -> bool {
    let code = c as u32;
    (0x4E00..=0x9FFF).contains(&code)
        || (0x3400..=0x4DBF).contains(&code)
        || (0x20000..=0x2EBEF).contains(&code)
        || (0x3040..=0x309F).contains(&code)
        || (0x30A0..=0x30FF).contains(&code)
        || (0x3000..=0x303F).contains(&code)
}

/// Simple text decoding fallback when no encoding is available.
fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    // Latin-1
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::StringFormat;

    fn op(operator: &str, operands: Vec<Object>) -> Operation {
        Operation::new(operator, operands)
    }

    fn int(n: i64) -> Object {
        Object::Integer(n)
    }

    fn text(s: &str) -> Object {
        Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
    }

    fn scan(ops: Vec<Operation>) -> Scan {
        let doc = LopdfDocument::with_version("1.5");
        let ctx = PageContext {
            doc: &doc,
            fonts: BTreeMap::new(),
            xobjects: HashMap::new(),
            left: 0.0,
            top: 792.0,
        };
        scan_operations(&ctx, &ops)
    }

    #[test]
    fn test_matrix_composition() {
        let scale = Matrix {
            a: 2.0,
            d: 2.0,
            ..Matrix::IDENTITY
        };
        let moved = Matrix::translation(10.0, 20.0).then(&scale);
        assert_eq!(moved.apply(1.0, 1.0), (22.0, 42.0));
        assert_eq!(moved.vertical_scale(), 2.0);
    }

    #[test]
    fn test_text_fragments_top_left() {
        let result = scan(vec![
            op("BT", vec![]),
            op("Tf", vec![Object::Name(b"F1".to_vec()), int(10)]),
            op("Td", vec![int(72), int(700)]),
            op("Tj", vec![text("Hello")]),
            op("Tj", vec![text(" world")]),
            op("T*", vec![]),
            op("Tj", vec![text("Next")]),
            op("ET", vec![]),
        ]);

        assert_eq!(result.fragments.len(), 3);
        let hello = &result.fragments[0];
        assert_eq!(hello.text, "Hello");
        assert_eq!(hello.bbox.x0, 72.0);
        assert_eq!(hello.bbox.y0, 92.0 - 8.0);
        assert_eq!(hello.bbox.width(), 25.0);

        // second show continues after the first
        assert_eq!(result.fragments[1].bbox.x0, 97.0);
        // T* moves down by 1.2 em when no leading is set
        assert_eq!(result.fragments[2].bbox.x0, 72.0);
        assert!(result.fragments[2].bbox.y0 > hello.bbox.y0);
    }

    #[test]
    fn test_tj_array_spacing() {
        let result = scan(vec![
            op("BT", vec![]),
            op(
                "TJ",
                vec![Object::Array(vec![
                    text("Net"),
                    Object::Integer(-250),
                    text("income"),
                    Object::Integer(-30),
                    text("s"),
                ])],
            ),
            op("ET", vec![]),
        ]);
        assert_eq!(result.fragments[0].text, "Net incomes");
    }

    #[test]
    fn test_rulings_from_stroked_paths() {
        let result = scan(vec![
            op("q", vec![]),
            op("cm", vec![int(1), int(0), int(0), int(1), int(0), int(100)]),
            op("m", vec![int(50), int(600)]),
            op("l", vec![int(300), int(600)]),
            op("S", vec![]),
            op("Q", vec![]),
            op("re", vec![int(50), int(500), int(100), int(20)]),
            op("n", vec![]),
        ]);

        assert_eq!(result.rulings.len(), 1);
        let seg = result.rulings[0];
        assert_eq!((seg.x0, seg.y0, seg.x1, seg.y1), (50.0, 92.0, 300.0, 92.0));
    }

    #[test]
    fn test_rectangle_edges() {
        let result = scan(vec![
            op("re", vec![int(10), int(10), int(100), int(50)]),
            op("f", vec![]),
        ]);
        assert_eq!(result.rulings.len(), 4);
        assert_eq!(result.rulings.iter().filter(|s| s.is_horizontal(0.5)).count(), 2);
        assert_eq!(result.rulings.iter().filter(|s| s.is_vertical(0.5)).count(), 2);
    }

    fn image_stream(entries: Vec<(&str, Object)>, content: Vec<u8>) -> Stream {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        for (key, value) in entries {
            dict.set(key, value);
        }
        Stream::new(dict, content)
    }

    fn name(n: &str) -> Object {
        Object::Name(n.as_bytes().to_vec())
    }

    fn decode_png(data: &[u8]) -> DynamicImage {
        image::load_from_memory_with_format(data, image::ImageFormat::Png).unwrap()
    }

    #[test]
    fn test_raw_gray_and_rgb_to_png() {
        let doc = LopdfDocument::with_version("1.5");
        let rgb = image_stream(
            vec![
                ("Width", int(2)),
                ("Height", int(1)),
                ("BitsPerComponent", int(8)),
                ("ColorSpace", name("DeviceRGB")),
            ],
            vec![255, 0, 0, 0, 255, 0],
        );
        let image = extract_image(&doc, &rgb).unwrap();
        assert_eq!(image.extension.as_deref(), Some("png"));
        let decoded = decode_png(&image.data).to_rgb8();
        assert_eq!(decoded.get_pixel(1, 0).0, [0, 255, 0]);

        // 1-bit gray, rows padded to a byte: 0b10 -> white, black
        let gray = image_stream(
            vec![
                ("Width", int(2)),
                ("Height", int(2)),
                ("BitsPerComponent", int(1)),
                ("ColorSpace", name("DeviceGray")),
            ],
            vec![0b1000_0000, 0b0100_0000],
        );
        let decoded = decode_png(&extract_image(&doc, &gray).unwrap().data).to_luma8();
        assert_eq!(decoded.get_pixel(0, 0).0, [255]);
        assert_eq!(decoded.get_pixel(1, 0).0, [0]);
        assert_eq!(decoded.get_pixel(1, 1).0, [255]);
    }

    #[test]
    fn test_indexed_palette_to_png() {
        let doc = LopdfDocument::with_version("1.5");
        let palette = Object::String(vec![255, 0, 0, 0, 0, 255], StringFormat::Hexadecimal);
        let stream = image_stream(
            vec![
                ("Width", int(3)),
                ("Height", int(1)),
                ("BitsPerComponent", int(4)),
                (
                    "ColorSpace",
                    Object::Array(vec![name("Indexed"), name("DeviceRGB"), int(1), palette]),
                ),
            ],
            // indices 1, 0, 1 packed at 4 bits
            vec![0x10, 0x10],
        );

        let decoded = decode_png(&extract_image(&doc, &stream).unwrap().data).to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(decoded.get_pixel(1, 0).0, [255, 0, 0]);
        assert_eq!(decoded.get_pixel(2, 0).0, [0, 0, 255]);
    }

    #[test]
    fn test_cmyk_to_png() {
        let doc = LopdfDocument::with_version("1.5");
        let stream = image_stream(
            vec![
                ("Width", int(2)),
                ("Height", int(1)),
                ("ColorSpace", name("DeviceCMYK")),
            ],
            vec![0, 0, 0, 0, 0, 0, 0, 255],
        );
        let decoded = decode_png(&extract_image(&doc, &stream).unwrap().data).to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(decoded.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_undecodable_images_give_reasons() {
        let doc = LopdfDocument::with_version("1.5");

        let fax = image_stream(
            vec![("Width", int(8)), ("Height", int(8)), ("Filter", name("CCITTFaxDecode"))],
            vec![0; 4],
        );
        assert!(extract_image(&doc, &fax).unwrap_err().contains("CCITTFaxDecode"));

        let separation = image_stream(
            vec![
                ("Width", int(1)),
                ("Height", int(1)),
                (
                    "ColorSpace",
                    Object::Array(vec![name("Separation"), name("Spot"), name("DeviceCMYK")]),
                ),
            ],
            vec![0],
        );
        assert!(extract_image(&doc, &separation).unwrap_err().contains("Separation"));

        let short = image_stream(
            vec![
                ("Width", int(4)),
                ("Height", int(4)),
                ("ColorSpace", name("DeviceGray")),
            ],
            vec![0; 3],
        );
        assert!(extract_image(&doc, &short).unwrap_err().contains("truncated"));
    }

    #[test]
    fn test_skipped_image_reported_by_scan() {
        let mut doc = LopdfDocument::with_version("1.5");
        let id = doc.add_object(image_stream(
            vec![("Width", int(8)), ("Height", int(8)), ("Filter", name("JBIG2Decode"))],
            vec![0; 4],
        ));
        let mut xobjects = HashMap::new();
        xobjects.insert(b"Im7".to_vec(), id);
        let ctx = PageContext {
            doc: &doc,
            fonts: BTreeMap::new(),
            xobjects,
            left: 0.0,
            top: 792.0,
        };

        let result = scan_operations(&ctx, &[op("Do", vec![name("Im7")])]);
        assert!(result.images.is_empty());
        assert_eq!(result.skipped_images.len(), 1);
        assert!(result.skipped_images[0].starts_with("image Im7: unsupported filter JBIG2Decode"));
    }

    #[test]
    fn test_media_box_parent_cycle() {
        let mut doc = LopdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut pages = Dictionary::new();
        pages.set("Type", name("Pages"));
        pages.set("Parent", Object::Reference(pages_id));
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut page = Dictionary::new();
        page.set("Type", name("Page"));
        page.set("Parent", Object::Reference(pages_id));

        assert_eq!(media_box(&doc, &page), (0.0, 0.0, 612.0, 792.0));
    }

    #[test]
    fn test_decode_text_simple() {
        assert_eq!(decode_text_simple(b"Hello"), "Hello");
        assert_eq!(decode_text_simple(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0x42]), "AB");
        assert_eq!(decode_text_simple(&[0x43, 0x61, 0x66, 0xE9]), "Café");
    }
}
