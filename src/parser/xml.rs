//! Shared OOXML plumbing: package parts, relationships, attribute access.

use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use zip::read::ZipArchive;

/// An unpacked OOXML package.
#[derive(Debug, Default)]
pub(crate) struct Package {
    parts: BTreeMap<String, Vec<u8>>,
}

impl Package {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut parts = BTreeMap::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            if name.ends_with('/') {
                continue;
            }
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            parts.insert(name, contents);
        }

        Ok(Self { parts })
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(|v| v.as_slice())
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Get a part that must exist.
    pub fn require_string(&self, name: &str) -> Result<String> {
        self.get_string(name)
            .ok_or_else(|| Error::SourceParse(format!("missing package part {name}")))
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(|k| k.as_str())
    }

    #[cfg(test)]
    pub fn insert(&mut self, name: &str, contents: Vec<u8>) {
        self.parts.insert(name.to_string(), contents);
    }
}

/// One entry of a `.rels` part.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    /// Last path segment of the relationship type URI (`image`, `hyperlink`).
    pub fn kind(&self) -> &str {
        self.rel_type.rsplit('/').next().unwrap_or("")
    }
}

/// Parse a `.rels` part, keeping document order.
pub(crate) fn parse_relationships(xml: &str) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let id = attr(e, b"Id");
                    let target = attr(e, b"Target");
                    if let (Some(id), Some(target)) = (id, target) {
                        rels.push(Relationship {
                            id,
                            rel_type: attr(e, b"Type").unwrap_or_default(),
                            target,
                            external: attr(e, b"TargetMode").as_deref() == Some("External"),
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// Resolve a relationship target against the directory of its source part.
///
/// `resolve_target("ppt/slides", "../media/image1.png")` is
/// `ppt/media/image1.png`. Absolute targets start from the package root.
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    let mut segments: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    segments.join("/")
}

/// Read an attribute by local name, ignoring its namespace prefix.
pub(crate) fn attr(element: &BytesStart, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .with_checks(false)
        .filter_map(|a| a.ok())
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Read the relationship id (`r:id`) of an element that also carries a plain `id`.
pub(crate) fn relationship_id(element: &BytesStart) -> Option<String> {
    element
        .attributes()
        .with_checks(false)
        .filter_map(|a| a.ok())
        .find(|a| a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id")
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Extension of a part name, if it has one.
pub(crate) fn part_extension(name: &str) -> Option<String> {
    let file = name.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    Some(ext.to_string())
}
