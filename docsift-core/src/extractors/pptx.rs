//! PowerPoint decks
//!
//! Slides are visited in presentation order. Each top-level shape is resolved
//! once to a [`ShapeKind`] and contributes lines to its slide's block:
//!
//! ```text
//! --- Slide 1 ---
//! Title text
//! Cell A | Cell B
//! [Image OCR]: recognized text
//! ```

use super::ooxml::{OoxmlPackage, Relationship, XmlElement, XmlNode};
use super::{join_non_empty, Extractor};
use crate::error::ExtractionError;
use crate::ocr::ImageOcr;
use crate::types::{DocumentFormat, ExtractionResult, Provenance, TextSegment};
use tracing::{debug, warn};

const PRESENTATION_PART: &str = "ppt/presentation.xml";

/// What a slide shape contributes, decided once per shape.
#[derive(Debug)]
enum ShapeKind<'a> {
    /// `p:sp` with a text body
    Text(&'a XmlElement),
    /// `p:graphicFrame` holding an `a:tbl`
    Table(&'a XmlElement),
    /// `p:grpSp`; children are read with the text strategies
    Group(&'a XmlElement),
    /// `p:pic`; carries the blip relationship id when present
    Picture(Option<&'a str>),
    Other,
}

impl<'a> ShapeKind<'a> {
    fn of(shape: &'a XmlElement) -> Self {
        match shape.name.as_str() {
            "sp" => shape.child("txBody").map_or(ShapeKind::Other, ShapeKind::Text),
            "graphicFrame" => shape.find("tbl").map_or(ShapeKind::Other, ShapeKind::Table),
            "grpSp" => ShapeKind::Group(shape),
            "pic" => ShapeKind::Picture(
                shape
                    .path(&["blipFill", "blip"])
                    .and_then(|blip| blip.attr("r:embed")),
            ),
            _ => ShapeKind::Other,
        }
    }
}

pub struct PptxExtractor {
    ocr: ImageOcr,
}

impl PptxExtractor {
    pub fn new(ocr: ImageOcr) -> Self {
        Self { ocr }
    }

    /// Slide part names in presentation order.
    fn slide_parts(package: &mut OoxmlPackage) -> Result<Vec<String>, ExtractionError> {
        let presentation = package.read_xml(PRESENTATION_PART)?;
        let relationships = package.relationships(PRESENTATION_PART)?;

        let Some(list) = presentation.child("sldIdLst") else {
            return Ok(Vec::new());
        };
        Ok(list
            .children_named("sldId")
            .filter_map(|slide| slide.attr("r:id"))
            .filter_map(|id| relationships.iter().find(|r| r.id == id))
            .map(|r| r.target.clone())
            .collect())
    }

    fn slide_segments(
        &self,
        package: &mut OoxmlPackage,
        part: &str,
        number: u32,
    ) -> Result<Vec<TextSegment>, ExtractionError> {
        let slide = package.read_xml(part)?;
        let relationships = package.relationships(part).unwrap_or_else(|e| {
            warn!(part, error = %e, "Unreadable slide relationships");
            Vec::new()
        });
        let Some(tree) = slide.path(&["cSld", "spTree"]) else {
            return Ok(Vec::new());
        };

        let mut segments = Vec::new();
        for shape in tree.elements() {
            match ShapeKind::of(shape) {
                ShapeKind::Text(body) => {
                    let text = text_body(body);
                    if !text.trim().is_empty() {
                        segments.push(TextSegment::new(Provenance::Direct, number, text.trim()));
                    }
                }
                ShapeKind::Table(table) => {
                    let text = table_text(table);
                    if !text.is_empty() {
                        segments.push(TextSegment::new(Provenance::Table, number, text));
                    }
                }
                ShapeKind::Group(group) => {
                    let text = group_text(group);
                    if !text.is_empty() {
                        segments.push(TextSegment::new(Provenance::Direct, number, text));
                    }
                }
                ShapeKind::Picture(Some(embed)) => {
                    let text = self.picture_text(package, &relationships, embed);
                    if !text.is_empty() {
                        segments.push(TextSegment::new(
                            Provenance::Ocr,
                            number,
                            format!("[Image OCR]: {text}"),
                        ));
                    }
                }
                ShapeKind::Picture(None) | ShapeKind::Other => {}
            }
        }
        Ok(segments)
    }

    fn picture_text(
        &self,
        package: &mut OoxmlPackage,
        relationships: &[Relationship],
        embed: &str,
    ) -> String {
        if !self.ocr.is_available() {
            return String::new();
        }
        let Some(rel) = relationships.iter().find(|r| r.id == embed && !r.external) else {
            return String::new();
        };
        match package.read_bytes(&rel.target) {
            Ok(bytes) => self.ocr.ocr_embedded(&bytes),
            Err(e) => {
                debug!(part = %rel.target, error = %e, "Picture image missing");
                String::new()
            }
        }
    }
}

impl Extractor for PptxExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pptx
    }

    fn extract_bytes(&self, bytes: &[u8]) -> Result<ExtractionResult, ExtractionError> {
        let mut package = OoxmlPackage::open(bytes.to_vec())?;
        let slides = Self::slide_parts(&mut package)?;

        let mut segments = Vec::new();
        let mut blocks = Vec::new();
        for (index, part) in slides.iter().enumerate() {
            let number = index as u32 + 1;
            let slide_segments = match self.slide_segments(&mut package, part, number) {
                Ok(s) => s,
                Err(e) => {
                    warn!(slide = number, error = %e, "Skipping unreadable slide");
                    continue;
                }
            };
            if slide_segments.is_empty() {
                continue;
            }
            let lines = slide_segments
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            blocks.push(format!("--- Slide {number} ---\n{lines}"));
            segments.extend(slide_segments);
        }

        let text = blocks.join("\n\n").trim().to_string();
        Ok(ExtractionResult::new(DocumentFormat::Pptx, text, segments))
    }
}

/// Paragraphs of a DrawingML text body, one per line.
fn text_body(body: &XmlElement) -> String {
    body.children_named("p")
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraph_text(paragraph: &XmlElement) -> String {
    let mut out = String::new();
    for child in paragraph.elements() {
        match child.name.as_str() {
            "r" | "fld" => {
                if let Some(t) = child.child("t") {
                    out.push_str(&t.text());
                }
            }
            "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

fn table_text(table: &XmlElement) -> String {
    let rows: Vec<String> = table
        .children_named("tr")
        .map(|row| {
            let cells: Vec<String> = row
                .children_named("tc")
                .map(|cell| cell.child("txBody").map(text_body).unwrap_or_default())
                .collect();
            join_non_empty(cells.iter().map(String::as_str), " | ")
        })
        .collect();
    join_non_empty(rows.iter().map(String::as_str), "\n")
}

/// Text of every text-bearing shape inside a group, nested groups included.
fn group_text(group: &XmlElement) -> String {
    let mut parts = Vec::new();
    collect_group_text(group, &mut parts);
    join_non_empty(parts.iter().map(String::as_str), "\n")
}

fn collect_group_text(group: &XmlElement, parts: &mut Vec<String>) {
    for child in &group.children {
        let XmlNode::Element(shape) = child else {
            continue;
        };
        match ShapeKind::of(shape) {
            ShapeKind::Text(body) => parts.push(text_body(body)),
            ShapeKind::Group(inner) => collect_group_text(inner, parts),
            _ => {}
        }
    }
}
