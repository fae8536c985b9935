//! DOCX reader.

use super::elements::{EmbeddedImage, FlowDocument, FlowElement, FlowParagraph};
use super::xml::{attr, parse_relationships, part_extension, resolve_target, Package};
use super::FlowReader;
use crate::error::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;

const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";
const STYLES_PART: &str = "word/styles.xml";

/// Reads `.docx` packages with `zip` and `quick-xml`.
///
/// Only top-level body paragraphs and tables are reported. Text of nested
/// tables is folded into the enclosing cell.
#[derive(Debug, Clone, Default)]
pub struct DocxReader {
    _private: (),
}

impl DocxReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an already unpacked package.
    pub(crate) fn read_package(&self, package: &Package) -> Result<FlowDocument> {
        let styles = match package.get_string(STYLES_PART) {
            Some(xml) => parse_style_names(&xml)?,
            None => HashMap::new(),
        };
        let rels = match package.get_string(DOCUMENT_RELS) {
            Some(xml) => parse_relationships(&xml)?,
            None => Vec::new(),
        };

        let body = parse_body(&package.require_string(DOCUMENT_PART)?)?;

        let elements: Vec<FlowElement> = body
            .elements
            .into_iter()
            .map(|element| match element {
                FlowElement::Paragraph(mut p) => {
                    p.style = p
                        .style
                        .map(|id| styles.get(&id).cloned().unwrap_or(id));
                    FlowElement::Paragraph(p)
                }
                other => other,
            })
            .collect();

        let hyperlinks = rels
            .iter()
            .filter(|r| r.kind() == "hyperlink")
            .map(|r| r.target.clone())
            .collect();

        let mut images = Vec::new();
        for rel in rels.iter().filter(|r| r.kind() == "image" && !r.external) {
            let part = resolve_target("word", &rel.target);
            match package.get(&part) {
                Some(data) => images.push(
                    EmbeddedImage::new(data.to_vec(), part_extension(&part))
                        .with_alt_text(body.alt_text.get(&rel.id).cloned()),
                ),
                None => log::warn!("DocxReader: image part {} is missing", part),
            }
        }

        log::debug!(
            "DocxReader: {} elements, {} hyperlinks, {} images",
            elements.len(),
            rels.iter().filter(|r| r.kind() == "hyperlink").count(),
            images.len()
        );

        Ok(FlowDocument {
            elements,
            hyperlinks,
            images,
        })
    }
}

impl FlowReader for DocxReader {
    fn read(&self, path: &Path) -> Result<FlowDocument> {
        let package = Package::open(path)?;
        self.read_package(&package)
    }
}

/// Map style ids to display names (`Heading1` -> `heading 1`).
fn parse_style_names(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut names = HashMap::new();
    let mut current_id: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"style" => current_id = attr(e, b"styleId"),
                b"name" => {
                    if let (Some(id), Some(name)) = (current_id.as_ref(), attr(e, b"val")) {
                        names.insert(id.clone(), name);
                    }
                }
                _ => {}
            },
            Event::End(ref e) if e.local_name().as_ref() == b"style" => current_id = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(names)
}

#[derive(Debug, Default)]
struct Body {
    elements: Vec<FlowElement>,
    /// Image descriptions keyed by relationship id
    alt_text: HashMap<String, String>,
}

/// Walk `word/document.xml` in storage order.
fn parse_body(xml: &str) -> Result<Body> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut body = Body::default();

    let mut table_depth = 0usize;
    // Text boxes nest paragraphs and runs inside a run of the outer paragraph
    let mut paragraph_depth = 0usize;
    let mut run_depth = 0usize;
    // mc:Fallback repeats the text box content for older readers
    let mut fallback_depth = 0usize;
    let mut in_text = false;
    let mut paragraph: Option<FlowParagraph> = None;
    let mut run: Option<String> = None;

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_paragraphs: Vec<String> = Vec::new();
    let mut cell_text = String::new();

    let mut description: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"p" => {
                    paragraph_depth += 1;
                    // A nested paragraph is folded into the enclosing one
                    match (paragraph_depth, table_depth) {
                        (1, 0) => paragraph = Some(FlowParagraph::default()),
                        (1, _) => cell_text.clear(),
                        _ => {}
                    }
                }
                b"pStyle" => {
                    if let (0, 1, Some(p)) = (table_depth, paragraph_depth, paragraph.as_mut()) {
                        p.style = attr(e, b"val");
                    }
                }
                b"r" => {
                    run_depth += 1;
                    if table_depth == 0 && run_depth == 1 {
                        run = Some(String::new());
                    }
                }
                b"t" => in_text = fallback_depth == 0,
                b"Fallback" => fallback_depth += 1,
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        rows.clear();
                    }
                }
                b"tr" if table_depth == 1 => row.clear(),
                b"tc" if table_depth == 1 => cell_paragraphs.clear(),
                b"docPr" => description = attr(e, b"descr"),
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"pStyle" => {
                    if let (0, 1, Some(p)) = (table_depth, paragraph_depth, paragraph.as_mut()) {
                        p.style = attr(e, b"val");
                    }
                }
                b"tab" if fallback_depth == 0 => {
                    push_text(table_depth, &mut run, &mut cell_text, "\t")
                }
                b"br" | b"cr" if fallback_depth == 0 => {
                    push_text(table_depth, &mut run, &mut cell_text, "\n")
                }
                b"docPr" => description = attr(e, b"descr"),
                b"blip" => {
                    if let (Some(id), Some(descr)) = (attr(e, b"embed"), description.as_ref()) {
                        body.alt_text.insert(id, descr.clone());
                    }
                }
                _ => {}
            },
            Event::Text(ref t) => {
                if in_text {
                    let text = t.unescape()?;
                    push_text(table_depth, &mut run, &mut cell_text, &text);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => {
                    run_depth = run_depth.saturating_sub(1);
                    if (run_depth, table_depth) == (0, 0) {
                        if let (Some(text), Some(p)) = (run.take(), paragraph.as_mut()) {
                            p.runs.push(text);
                        }
                    }
                }
                b"Fallback" => fallback_depth = fallback_depth.saturating_sub(1),
                b"p" => {
                    paragraph_depth = paragraph_depth.saturating_sub(1);
                    match (paragraph_depth, table_depth) {
                        (0, 0) => {
                            if let Some(p) = paragraph.take() {
                                body.elements.push(FlowElement::Paragraph(p));
                            }
                        }
                        (0, _) => cell_paragraphs.push(std::mem::take(&mut cell_text)),
                        _ => {}
                    }
                }
                b"tc" if table_depth == 1 => row.push(cell_paragraphs.join("\n")),
                b"tr" if table_depth == 1 => rows.push(std::mem::take(&mut row)),
                b"tbl" => {
                    if table_depth == 1 {
                        body.elements
                            .push(FlowElement::Table(std::mem::take(&mut rows)));
                    }
                    table_depth = table_depth.saturating_sub(1);
                }
                b"inline" | b"anchor" => description = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(body)
}

fn push_text(table_depth: usize, run: &mut Option<String>, cell_text: &mut String, text: &str) {
    if table_depth == 0 {
        if let Some(run) = run.as_mut() {
            run.push_str(text);
        }
    } else {
        cell_text.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<w:document xmlns:w="w" xmlns:a="a" xmlns:r="r" xmlns:wp="wp"><w:body>
<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Intro</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve"> See </w:t></w:r><w:hyperlink r:id="rId1"><w:r><w:t>https://example.com</w:t></w:r></w:hyperlink></w:p>
<w:tbl>
  <w:tr><w:tc><w:p><w:r><w:t>Name</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Age</w:t></w:r></w:p></w:tc></w:tr>
  <w:tr><w:tc><w:p><w:r><w:t>Ana</w:t></w:r></w:p><w:p><w:r><w:t>Lee</w:t></w:r></w:p></w:tc><w:tc><w:p/></w:tc></w:tr>
</w:tbl>
<w:p><w:r><w:drawing><wp:inline><wp:docPr id="1" name="Picture 1" descr="A chart"/><a:graphic><a:blip r:embed="rId5"/></a:graphic></wp:inline></w:drawing></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn test_parse_body_order() {
        let body = parse_body(BODY).unwrap();
        assert_eq!(body.elements.len(), 4);

        match &body.elements[0] {
            FlowElement::Paragraph(p) => {
                assert_eq!(p.style.as_deref(), Some("Heading1"));
                assert_eq!(p.runs, vec!["Intro"]);
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
        match &body.elements[1] {
            FlowElement::Paragraph(p) => assert_eq!(p.runs, vec![" See ", "https://example.com"]),
            other => panic!("expected paragraph, got {:?}", other),
        }
        match &body.elements[2] {
            FlowElement::Table(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0], vec!["Name", "Age"]);
                assert_eq!(rows[1], vec!["Ana\nLee", ""]);
            }
            other => panic!("expected table, got {:?}", other),
        }
        assert_eq!(body.alt_text.get("rId5").map(String::as_str), Some("A chart"));
    }

    #[test]
    fn test_text_box_keeps_outer_paragraph() {
        let xml = r#"<w:document xmlns:w="w" xmlns:mc="mc" xmlns:wps="wps" xmlns:v="v"><w:body>
<w:p><w:pPr><w:pStyle w:val="Caption"/></w:pPr><w:r><w:t xml:space="preserve">Before </w:t></w:r><w:r><mc:AlternateContent><mc:Choice Requires="wps"><w:drawing><wps:txbx><w:txbxContent><w:p><w:pPr><w:pStyle w:val="Boxed"/></w:pPr><w:r><w:t>Inside</w:t></w:r></w:p></w:txbxContent></wps:txbx></w:drawing></mc:Choice><mc:Fallback><w:pict><v:textbox><w:txbxContent><w:p><w:r><w:t>Inside</w:t></w:r></w:p></w:txbxContent></v:textbox></w:pict></mc:Fallback></mc:AlternateContent></w:r><w:r><w:t xml:space="preserve"> after</w:t></w:r></w:p>
<w:p><w:r><w:t>Next</w:t></w:r></w:p>
</w:body></w:document>"#;
        let body = parse_body(xml).unwrap();

        assert_eq!(body.elements.len(), 2);
        match &body.elements[0] {
            FlowElement::Paragraph(p) => {
                assert_eq!(p.style.as_deref(), Some("Caption"));
                assert_eq!(p.runs, vec!["Before ", "Inside", " after"]);
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
        match &body.elements[1] {
            FlowElement::Paragraph(p) => assert_eq!(p.runs, vec!["Next"]),
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_style_names() {
        let xml = r#"<w:styles xmlns:w="w">
<w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/></w:style>
<w:style w:type="paragraph" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
</w:styles>"#;
        let names = parse_style_names(xml).unwrap();
        assert_eq!(names.get("Heading2").map(String::as_str), Some("heading 2"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_read_package() {
        let mut package = Package::default();
        package.insert(DOCUMENT_PART, BODY.as_bytes().to_vec());
        package.insert(
            STYLES_PART,
            br#"<w:styles xmlns:w="w"><w:style w:styleId="Heading1"><w:name w:val="heading 1"/></w:style></w:styles>"#.to_vec(),
        );
        package.insert(
            DOCUMENT_RELS,
            br#"<Relationships>
<Relationship Id="rId1" Type="http://x/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
<Relationship Id="rId5" Type="http://x/relationships/image" Target="media/image1.png"/>
</Relationships>"#
                .to_vec(),
        );
        package.insert("word/media/image1.png", vec![0x89, b'P', b'N', b'G']);

        let doc = DocxReader::new().read_package(&package).unwrap();
        match &doc.elements[0] {
            FlowElement::Paragraph(p) => assert_eq!(p.style.as_deref(), Some("heading 1")),
            other => panic!("expected paragraph, got {:?}", other),
        }
        assert_eq!(doc.hyperlinks, vec!["https://example.com"]);
        assert_eq!(doc.images.len(), 1);
        assert_eq!(doc.images[0].extension.as_deref(), Some("png"));
        assert_eq!(doc.images[0].alt_text.as_deref(), Some("A chart"));
    }

    #[test]
    fn test_missing_document_part() {
        let package = Package::default();
        assert!(DocxReader::new().read_package(&package).is_err());
    }
}
