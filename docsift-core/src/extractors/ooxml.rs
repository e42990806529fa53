//! Minimal Office Open XML package reader shared by the DOCX and PPTX
//! extractors: a zip container, relationship parts, and a small element tree
//! built with quick-xml.

use crate::error::ExtractionError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// An opened `.docx`/`.pptx` container.
pub struct OoxmlPackage {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl OoxmlPackage {
    pub fn open(bytes: Vec<u8>) -> Result<Self, ExtractionError> {
        Ok(Self {
            archive: ZipArchive::new(Cursor::new(bytes))?,
        })
    }

    pub fn has_part(&self, part: &str) -> bool {
        self.archive.file_names().any(|n| n == part)
    }

    pub fn read_bytes(&mut self, part: &str) -> Result<Vec<u8>, ExtractionError> {
        let mut file = match self.archive.by_name(part) {
            Ok(f) => f,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(ExtractionError::MissingPart(part.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn read_xml(&mut self, part: &str) -> Result<XmlElement, ExtractionError> {
        let bytes = self.read_bytes(part)?;
        XmlElement::parse(&bytes)
    }

    /// Relationships declared by `part`, in document order. A part without a
    /// relationships file has none.
    pub fn relationships(&mut self, part: &str) -> Result<Vec<Relationship>, ExtractionError> {
        let rels_part = rels_part_for(part);
        if !self.has_part(&rels_part) {
            return Ok(Vec::new());
        }
        let root = self.read_xml(&rels_part)?;
        Ok(root
            .children_named("Relationship")
            .filter_map(|rel| {
                let id = rel.attr("Id")?.to_string();
                let target = rel.attr("Target")?;
                let external = rel
                    .attr("TargetMode")
                    .is_some_and(|m| m.eq_ignore_ascii_case("External"));
                Some(Relationship {
                    id,
                    rel_type: rel.attr("Type").unwrap_or_default().to_string(),
                    target: if external {
                        target.to_string()
                    } else {
                        resolve_target(part, target)
                    },
                    external,
                })
            })
            .collect())
    }
}

/// One entry of a `_rels/*.rels` part. `target` is already resolved to a
/// package-absolute part name (for internal targets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    /// Relationship type with the namespace URI stripped, e.g. `header`.
    pub fn kind(&self) -> &str {
        self.rel_type.rsplit('/').next().unwrap_or_default()
    }
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`
fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/_rels/{name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the directory of its source part.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
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

/// A parsed XML element. Names are local (namespace prefix dropped);
/// attribute keys keep their prefix (`r:id`, `r:embed`).
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    /// Parse a whole document and return its root element.
    pub fn parse(xml: &[u8]) -> Result<XmlElement, ExtractionError> {
        let mut reader = Reader::from_reader(xml);
        reader.trim_text(false);

        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => stack.push(Self::from_start(&e)?),
                Event::Empty(e) => {
                    let element = Self::from_start(&e)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| ExtractionError::Xml("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        top.children.push(XmlNode::Text(t.unescape()?.into_owned()));
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                        top.children.push(XmlNode::Text(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(ExtractionError::Xml("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| ExtractionError::Xml("document has no root element".to_string()))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<XmlElement, ExtractionError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ExtractionError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(XmlElement {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    /// Follow a chain of direct children, e.g. `["cSld", "spTree"]`.
    pub fn path(&self, names: &[&str]) -> Option<&XmlElement> {
        names.iter().try_fold(self, |el, name| el.child(name))
    }

    /// All descendants with this name, depth-first in document order.
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlElement>) {
        for child in self.elements() {
            if child.name == name {
                found.push(child);
            }
            child.collect_descendants(name, found);
        }
    }

    /// First descendant with this name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        for child in self.elements() {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::build_package;
    use super::*;

    #[test]
    fn parses_nested_elements_and_text() {
        let xml = br#"<?xml version="1.0"?>
<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t xml:space="preserve">Hello &amp; </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.name, "document");
        let body = root.child("body").unwrap();
        assert_eq!(body.elements().count(), 2);
        let texts: Vec<String> = root.descendants("t").iter().map(|t| t.text()).collect();
        assert_eq!(texts, vec!["Hello & ".to_string(), "world".to_string()]);
        assert_eq!(root.find("sectPr").map(|e| e.children.len()), Some(0));
    }

    #[test]
    fn keeps_prefixed_attribute_keys() {
        let xml = br#"<p:sldId xmlns:p="urn:p" xmlns:r="urn:r" id="256" r:id="rId2"/>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.attr("r:id"), Some("rId2"));
        assert_eq!(root.attr("id"), Some("256"));
    }

    #[test]
    fn rejects_truncated_xml() {
        assert!(XmlElement::parse(b"<a><b>text</b>").is_err());
        assert!(XmlElement::parse(b"").is_err());
    }

    #[test]
    fn resolves_relative_targets() {
        assert_eq!(resolve_target("word/document.xml", "media/image1.png"), "word/media/image1.png");
        assert_eq!(
            resolve_target("ppt/slides/slide1.xml", "../media/image2.jpeg"),
            "ppt/media/image2.jpeg"
        );
        assert_eq!(resolve_target("ppt/presentation.xml", "/ppt/slides/slide3.xml"), "ppt/slides/slide3.xml");
        assert_eq!(rels_part_for("word/document.xml"), "word/_rels/document.xml.rels");
    }

    #[test]
    fn reads_relationships_in_order() {
        let rels = br#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/>
  <Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;
        let bytes = build_package(&[
            ("word/document.xml", b"<document/>"),
            ("word/_rels/document.xml.rels", rels),
        ]);
        let mut package = OoxmlPackage::open(bytes).unwrap();
        let rels = package.relationships("word/document.xml").unwrap();
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].kind(), "header");
        assert_eq!(rels[0].target, "word/header1.xml");
        assert!(rels[1].external);

        assert!(package.relationships("word/header1.xml").unwrap().is_empty());
        assert!(matches!(
            package.read_bytes("word/missing.xml"),
            Err(ExtractionError::MissingPart(_))
        ));
    }
}
