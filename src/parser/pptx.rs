//! PPTX reader.

use super::elements::{EmbeddedImage, Slide, SlideDeck, SlideShape};
use super::xml::{
    attr, parse_relationships, part_extension, relationship_id, resolve_target, Package,
};
use super::DeckReader;
use crate::error::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

const SLIDE_PART: &str = r"^ppt/slides/slide(\d+)\.xml$";
const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

/// Reads `.pptx` packages with `zip` and `quick-xml`.
///
/// Slides follow the slide list in `ppt/presentation.xml`; packages without
/// one fall back to part-number order. Shapes inside groups are reported as
/// if they sat directly on the slide.
#[derive(Debug, Clone, Default)]
pub struct PptxReader {
    _private: (),
}

impl PptxReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read_package(&self, package: &Package) -> Result<SlideDeck> {
        let listed = match package.get_string(PRESENTATION_PART) {
            Some(xml) => presentation_order(&xml, package)?,
            None => Vec::new(),
        };
        let parts = if listed.is_empty() {
            numeric_order(package)?
        } else {
            listed
        };

        if parts.is_empty() && package.get(PRESENTATION_PART).is_none() {
            return Err(Error::SourceParse("not a slide deck package".to_string()));
        }

        let mut deck = SlideDeck::default();
        for (index, part) in parts.iter().enumerate() {
            let number = index + 1;
            let (dir, file) = part.rsplit_once('/').unwrap_or(("", part.as_str()));
            let rels_part = format!("{dir}/_rels/{file}.rels");
            let media: HashMap<String, String> = match package.get_string(&rels_part) {
                Some(xml) => parse_relationships(&xml)?
                    .into_iter()
                    .filter(|r| !r.external)
                    .map(|r| (r.id, resolve_target(dir, &r.target)))
                    .collect(),
                None => HashMap::new(),
            };

            let shapes = parse_slide(&package.require_string(part)?)?
                .into_iter()
                .map(|shape| match shape {
                    RawShape::Text(text) => SlideShape::Text(text),
                    RawShape::Table(rows) => SlideShape::Table(rows),
                    RawShape::Picture { embed, descr } => {
                        let target = embed.and_then(|id| media.get(&id));
                        match target.and_then(|p| package.get(p).map(|data| (p, data))) {
                            Some((p, data)) => SlideShape::Picture(
                                EmbeddedImage::new(data.to_vec(), part_extension(p))
                                    .with_alt_text(descr),
                            ),
                            None => {
                                log::warn!("PptxReader: slide {} picture has no image part", number);
                                SlideShape::Other
                            }
                        }
                    }
                    RawShape::Other => SlideShape::Other,
                })
                .collect();

            deck.slides.push(Slide { shapes });
        }

        log::debug!("PptxReader: {} slides", deck.slides.len());
        Ok(deck)
    }
}

/// Slide parts in the order `p:sldIdLst` lists them.
///
/// Entries whose relationship or part is missing are skipped.
fn presentation_order(xml: &str, package: &Package) -> Result<Vec<String>> {
    let targets: HashMap<String, String> = match package.get_string(PRESENTATION_RELS) {
        Some(rels) => parse_relationships(&rels)?
            .into_iter()
            .filter(|r| !r.external)
            .map(|r| (r.id, resolve_target("ppt", &r.target)))
            .collect(),
        None => HashMap::new(),
    };

    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut parts = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sldId" => {
                let part = relationship_id(e).and_then(|id| targets.get(&id));
                match part {
                    Some(part) if package.get(part).is_some() => parts.push(part.clone()),
                    _ => log::warn!(
                        "PptxReader: slide list entry {:?} has no slide part",
                        relationship_id(e)
                    ),
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(parts)
}

/// Slide parts sorted by the number in their name.
fn numeric_order(package: &Package) -> Result<Vec<String>> {
    let pattern = Regex::new(SLIDE_PART).map_err(|e| Error::SourceParse(e.to_string()))?;

    let mut parts: Vec<(u32, String)> = package
        .part_names()
        .filter_map(|name| {
            let number = pattern.captures(name)?.get(1)?.as_str().parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    parts.sort_by_key(|(number, _)| *number);

    Ok(parts.into_iter().map(|(_, name)| name).collect())
}

impl DeckReader for PptxReader {
    fn read(&self, path: &Path) -> Result<SlideDeck> {
        let package = Package::open(path)?;
        self.read_package(&package)
    }
}

#[derive(Debug, PartialEq)]
enum RawShape {
    Text(String),
    Table(Vec<Vec<String>>),
    Picture {
        embed: Option<String>,
        descr: Option<String>,
    },
    Other,
}

enum Open {
    Text {
        has_body: bool,
        paragraphs: Vec<String>,
        current: String,
    },
    Frame {
        rows: Vec<Vec<String>>,
        row: Vec<String>,
        cell: Vec<String>,
        current: String,
    },
    Picture {
        embed: Option<String>,
        descr: Option<String>,
    },
}

/// Walk one slide part and list its shapes in placement order.
fn parse_slide(xml: &str) -> Result<Vec<RawShape>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut shapes = Vec::new();
    let mut open: Option<Open> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match (e.local_name().as_ref(), open.as_mut()) {
                (b"sp", None) => {
                    open = Some(Open::Text {
                        has_body: false,
                        paragraphs: Vec::new(),
                        current: String::new(),
                    })
                }
                (b"graphicFrame", None) => {
                    open = Some(Open::Frame {
                        rows: Vec::new(),
                        row: Vec::new(),
                        cell: Vec::new(),
                        current: String::new(),
                    })
                }
                (b"pic", None) => {
                    open = Some(Open::Picture {
                        embed: None,
                        descr: None,
                    })
                }
                (b"txBody", Some(Open::Text { has_body, .. })) => *has_body = true,
                (b"p", Some(Open::Text { current, .. }))
                | (b"p", Some(Open::Frame { current, .. })) => current.clear(),
                (b"tr", Some(Open::Frame { row, .. })) => row.clear(),
                (b"tc", Some(Open::Frame { cell, .. })) => cell.clear(),
                (b"t", Some(_)) => in_text = true,
                (b"cNvPr", Some(Open::Picture { descr, .. })) => *descr = attr(e, b"descr"),
                (b"blip", Some(Open::Picture { embed, .. })) => *embed = attr(e, b"embed"),
                _ => {}
            },
            Event::Empty(ref e) => match (e.local_name().as_ref(), open.as_mut()) {
                (b"br", Some(Open::Text { current, .. }))
                | (b"br", Some(Open::Frame { current, .. })) => current.push('\n'),
                (b"cNvPr", Some(Open::Picture { descr, .. })) => *descr = attr(e, b"descr"),
                (b"blip", Some(Open::Picture { embed, .. })) => *embed = attr(e, b"embed"),
                _ => {}
            },
            Event::Text(ref t) => {
                if in_text {
                    let text = t.unescape()?;
                    match open.as_mut() {
                        Some(Open::Text { current, .. }) | Some(Open::Frame { current, .. }) => {
                            current.push_str(&text)
                        }
                        _ => {}
                    }
                }
            }
            Event::End(ref e) => match (e.local_name().as_ref(), open.as_mut()) {
                (b"t", _) => in_text = false,
                (b"p", Some(Open::Text {
                    paragraphs, current, ..
                })) => paragraphs.push(std::mem::take(current)),
                (b"p", Some(Open::Frame { cell, current, .. })) => {
                    cell.push(std::mem::take(current))
                }
                (b"tc", Some(Open::Frame { row, cell, .. })) => row.push(cell.join("\n")),
                (b"tr", Some(Open::Frame { rows, row, .. })) => rows.push(std::mem::take(row)),
                (b"sp", Some(Open::Text { .. }))
                | (b"graphicFrame", Some(Open::Frame { .. }))
                | (b"pic", Some(Open::Picture { .. })) => {
                    if let Some(done) = open.take() {
                        shapes.push(close_shape(done));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(shapes)
}

fn close_shape(open: Open) -> RawShape {
    match open {
        Open::Text {
            has_body: true,
            paragraphs,
            ..
        } => RawShape::Text(paragraphs.join("\n")),
        Open::Text { .. } => RawShape::Other,
        Open::Frame { rows, .. } if !rows.is_empty() => RawShape::Table(rows),
        Open::Frame { .. } => RawShape::Other,
        Open::Picture { embed, descr } => RawShape::Picture { embed, descr },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDE: &str = r#"<p:sld xmlns:p="p" xmlns:a="a" xmlns:r="r"><p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title"/></p:nvSpPr><p:txBody><a:p><a:r><a:t>Quarterly</a:t></a:r><a:r><a:t> results</a:t></a:r></a:p><a:p><a:r><a:t>Second line</a:t></a:r></a:p></p:txBody></p:sp>
<p:graphicFrame><a:graphic><a:graphicData><a:tbl>
  <a:tr><a:tc><a:txBody><a:p><a:r><a:t>Q</a:t></a:r></a:p></a:txBody></a:tc><a:tc><a:txBody><a:p><a:r><a:t>Revenue</a:t></a:r></a:p></a:txBody></a:tc></a:tr>
  <a:tr><a:tc><a:txBody><a:p><a:r><a:t>Q1</a:t></a:r></a:p></a:txBody></a:tc><a:tc><a:txBody><a:p/></a:txBody></a:tc></a:tr>
</a:tbl></a:graphicData></a:graphic></p:graphicFrame>
<p:pic><p:nvPicPr><p:cNvPr id="4" name="Picture 3" descr="Logo"/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/></p:blipFill></p:pic>
<p:cxnSp><p:nvCxnSpPr/></p:cxnSp>
<p:sp><p:nvSpPr><p:cNvPr id="5" name="Rect"/></p:nvSpPr></p:sp>
</p:spTree></p:cSld></p:sld>"#;

    #[test]
    fn test_parse_slide_shapes_in_order() {
        let shapes = parse_slide(SLIDE).unwrap();
        assert_eq!(shapes.len(), 4);
        assert_eq!(
            shapes[0],
            RawShape::Text("Quarterly results\nSecond line".into())
        );
        assert_eq!(
            shapes[1],
            RawShape::Table(vec![
                vec!["Q".into(), "Revenue".into()],
                vec!["Q1".into(), "".into()],
            ])
        );
        assert_eq!(
            shapes[2],
            RawShape::Picture {
                embed: Some("rId2".into()),
                descr: Some("Logo".into())
            }
        );
        assert_eq!(shapes[3], RawShape::Other);
    }

    #[test]
    fn test_read_package_orders_slides_numerically() {
        let mut package = Package::default();
        package.insert("ppt/presentation.xml", b"<p:presentation/>".to_vec());
        for n in [10, 2, 1] {
            let xml = format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>S{n}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
            );
            package.insert(&format!("ppt/slides/slide{n}.xml"), xml.into_bytes());
        }

        let deck = PptxReader::new().read_package(&package).unwrap();
        let firsts: Vec<_> = deck
            .slides
            .iter()
            .map(|s| s.shapes[0].clone())
            .collect();
        assert_eq!(
            firsts,
            vec![
                SlideShape::Text("S1".into()),
                SlideShape::Text("S2".into()),
                SlideShape::Text("S10".into()),
            ]
        );
    }

    #[test]
    fn test_slide_list_sets_order() {
        let mut package = Package::default();
        package.insert(
            PRESENTATION_PART,
            br#"<p:presentation xmlns:p="p" xmlns:r="r"><p:sldIdLst>
<p:sldId id="257" r:id="rId3"/><p:sldId id="256" r:id="rId2"/><p:sldId id="258" r:id="rId9"/>
</p:sldIdLst></p:presentation>"#
                .to_vec(),
        );
        package.insert(
            PRESENTATION_RELS,
            br#"<Relationships>
<Relationship Id="rId2" Type="http://x/slide" Target="slides/slide1.xml"/>
<Relationship Id="rId3" Type="http://x/slide" Target="slides/slide2.xml"/>
<Relationship Id="rId9" Type="http://x/slide" Target="slides/slide9.xml"/>
</Relationships>"#
                .to_vec(),
        );
        for (n, text) in [(1, "Moved last"), (2, "Shown first"), (3, "Not listed")] {
            let xml = format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
            );
            package.insert(&format!("ppt/slides/slide{n}.xml"), xml.into_bytes());
        }

        let deck = PptxReader::new().read_package(&package).unwrap();
        let firsts: Vec<_> = deck.slides.iter().map(|s| s.shapes[0].clone()).collect();
        assert_eq!(
            firsts,
            vec![
                SlideShape::Text("Shown first".into()),
                SlideShape::Text("Moved last".into()),
            ]
        );
    }

    #[test]
    fn test_picture_resolved_through_slide_rels() {
        let mut package = Package::default();
        package.insert("ppt/slides/slide1.xml", SLIDE.as_bytes().to_vec());
        package.insert(
            "ppt/slides/_rels/slide1.xml.rels",
            br#"<Relationships><Relationship Id="rId2" Type="http://x/image" Target="../media/image7.jpeg"/></Relationships>"#.to_vec(),
        );
        package.insert("ppt/media/image7.jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0]);

        let deck = PptxReader::new().read_package(&package).unwrap();
        match &deck.slides[0].shapes[2] {
            SlideShape::Picture(img) => {
                assert_eq!(img.data, vec![0xFF, 0xD8, 0xFF, 0xE0]);
                assert_eq!(img.extension.as_deref(), Some("jpeg"));
                assert_eq!(img.alt_text.as_deref(), Some("Logo"));
            }
            other => panic!("expected picture, got {:?}", other),
        }
    }

    #[test]
    fn test_not_a_deck() {
        let package = Package::default();
        assert!(PptxReader::new().read_package(&package).is_err());
    }
}
