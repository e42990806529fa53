//! Word documents
//!
//! Text is collected in a fixed order: body paragraphs, body tables, header
//! paragraphs, footer paragraphs, then any remaining `w:t` run in the main
//! part that the earlier passes did not already cover (content controls, text
//! boxes). Embedded raster images are OCR'd and appended last.

use super::ooxml::{OoxmlPackage, XmlElement, XmlNode};
use super::{join_non_empty, Extractor};
use crate::error::ExtractionError;
use crate::ocr::ImageOcr;
use crate::types::{DocumentFormat, ExtractionResult, Provenance, TextSegment};
use tracing::{debug, warn};

const MAIN_PART: &str = "word/document.xml";

pub struct DocxExtractor {
    ocr: ImageOcr,
}

impl DocxExtractor {
    pub fn new(ocr: ImageOcr) -> Self {
        Self { ocr }
    }

    /// Paragraphs of a header or footer part, `None` if it cannot be read.
    fn part_paragraphs(package: &mut OoxmlPackage, part: &str) -> Option<Vec<String>> {
        match package.read_xml(part) {
            Ok(root) => Some(
                root.children_named("p")
                    .map(paragraph_text)
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| t.trim().to_string())
                    .collect(),
            ),
            Err(e) => {
                warn!(part, error = %e, "Skipping unreadable header/footer");
                None
            }
        }
    }
}

impl Extractor for DocxExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn extract_bytes(&self, bytes: &[u8]) -> Result<ExtractionResult, ExtractionError> {
        let mut package = OoxmlPackage::open(bytes.to_vec())?;
        let document = package.read_xml(MAIN_PART)?;
        let body = document
            .child("body")
            .ok_or_else(|| ExtractionError::Xml("document has no body".to_string()))?;

        let mut segments: Vec<TextSegment> = Vec::new();

        for paragraph in body.children_named("p") {
            let text = paragraph_text(paragraph);
            if !text.trim().is_empty() {
                segments.push(TextSegment::new(Provenance::Direct, 0, text.trim()));
            }
        }

        for table in body.children_named("tbl") {
            let rendered = table_text(table);
            if !rendered.is_empty() {
                segments.push(TextSegment::new(Provenance::Table, 0, rendered));
            }
        }

        let relationships = package.relationships(MAIN_PART).unwrap_or_else(|e| {
            warn!(error = %e, "Unreadable document relationships");
            Vec::new()
        });

        for kind in ["header", "footer"] {
            for rel in relationships.iter().filter(|r| !r.external && r.kind() == kind) {
                if let Some(paragraphs) = Self::part_paragraphs(&mut package, &rel.target) {
                    segments.extend(
                        paragraphs
                            .into_iter()
                            .map(|p| TextSegment::new(Provenance::Direct, 0, p)),
                    );
                }
            }
        }

        // Runs the structured passes missed (content controls, text boxes),
        // checked against everything collected so far including earlier sweeps
        let mut accumulated = join_non_empty(segments.iter().map(|s| s.text.as_str()), " ");
        for run in document.descendants("t") {
            let text = run.text();
            let text = text.trim();
            if text.is_empty() || accumulated.contains(text) {
                continue;
            }
            accumulated.push(' ');
            accumulated.push_str(text);
            segments.push(TextSegment::new(Provenance::Direct, 0, text));
        }

        for rel in relationships
            .iter()
            .filter(|r| !r.external && r.target.contains("image"))
        {
            let image = match package.read_bytes(&rel.target) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(part = %rel.target, error = %e, "Embedded image missing");
                    continue;
                }
            };
            let text = self.ocr.ocr_embedded(&image);
            if !text.is_empty() {
                segments.push(TextSegment::new(Provenance::Ocr, 0, text));
            }
        }

        let text = join_non_empty(segments.iter().map(|s| s.text.as_str()), "\n");
        Ok(ExtractionResult::new(DocumentFormat::Docx, text, segments))
    }
}

/// Visible text of a `w:p`: runs, tabs and breaks, excluding nested text boxes.
fn paragraph_text(paragraph: &XmlElement) -> String {
    let mut out = String::new();
    collect_run_text(paragraph, &mut out);
    out
}

fn collect_run_text(element: &XmlElement, out: &mut String) {
    for child in &element.children {
        let XmlNode::Element(el) = child else {
            continue;
        };
        match el.name.as_str() {
            "t" => out.push_str(&el.text()),
            "tab" => out.push('\t'),
            "br" | "cr" => out.push('\n'),
            "txbxContent" | "pPr" | "rPr" => {}
            _ => collect_run_text(el, out),
        }
    }
}

/// Rows of non-empty cells joined by ` | `, one row per line.
fn table_text(table: &XmlElement) -> String {
    let rows: Vec<String> = table
        .children_named("tr")
        .map(|row| {
            let cells: Vec<String> = row
                .children_named("tc")
                .map(|cell| {
                    cell.children_named("p")
                        .map(paragraph_text)
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .collect();
            join_non_empty(cells.iter().map(String::as_str), " | ")
        })
        .collect();
    join_non_empty(rows.iter().map(String::as_str), "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::ooxml::testing::build_package;
    use crate::ocr::testing::{png_bytes, CountingEngine};

    const W_NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

    fn document_xml(body: &str) -> String {
        format!(r#"<?xml version="1.0" encoding="UTF-8"?><w:document {W_NS}><w:body>{body}</w:body></w:document>"#)
    }

    fn para(text: &str) -> String {
        format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>")
    }

    fn rels(entries: &[(&str, &str, &str)]) -> String {
        let body: String = entries
            .iter()
            .map(|(id, kind, target)| {
                format!(
                    r#"<Relationship Id="{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/{kind}" Target="{target}"/>"#
                )
            })
            .collect();
        format!(r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{body}</Relationships>"#)
    }

    #[test]
    fn collects_paragraphs_tables_headers_and_footers_in_order() {
        let body = format!(
            "{}{}<w:tbl><w:tr><w:tc>{}</w:tc><w:tc>{}</w:tc><w:tc><w:p/></w:tc></w:tr><w:tr><w:tc><w:p/></w:tc></w:tr><w:tr><w:tc>{}</w:tc><w:tc>{}</w:tc></w:tr></w:tbl>",
            para("First paragraph"),
            para("   "),
            para("Name"),
            para("Dose"),
            para("Aspirin"),
            para("100mg"),
        );
        let document = document_xml(&body);
        let header = format!(r#"<w:hdr {W_NS}>{}</w:hdr>"#, para("Header line"));
        let footer = format!(r#"<w:ftr {W_NS}>{}</w:ftr>"#, para("Footer line"));
        let rels = rels(&[("rId1", "footer", "footer1.xml"), ("rId2", "header", "header1.xml")]);
        let bytes = build_package(&[
            ("word/document.xml", document.as_bytes()),
            ("word/_rels/document.xml.rels", rels.as_bytes()),
            ("word/header1.xml", header.as_bytes()),
            ("word/footer1.xml", footer.as_bytes()),
        ]);

        let result = DocxExtractor::new(ImageOcr::disabled()).extract_bytes(&bytes).unwrap();
        assert_eq!(
            result.text,
            "First paragraph\nName | Dose\nAspirin | 100mg\nHeader line\nFooter line"
        );
        assert_eq!(result.count_by(Provenance::Table), 1);
    }

    #[test]
    fn paragraph_runs_tabs_and_breaks() {
        let body = r#"<w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Left</w:t><w:tab/><w:t>Right</w:t><w:br/><w:t>Below</w:t></w:r><w:hyperlink r:id="rId5"><w:r><w:t> link</w:t></w:r></w:hyperlink></w:p>"#;
        let bytes = build_package(&[("word/document.xml", document_xml(body).as_bytes())]);
        let text = DocxExtractor::new(ImageOcr::disabled()).extract_bytes(&bytes).unwrap().text;
        assert_eq!(text, "Left\tRight\nBelow link");
    }

    #[test]
    fn sweeps_runs_outside_body_paragraphs() {
        let body = format!(
            "{}<w:sdt><w:sdtContent>{}{}</w:sdtContent></w:sdt>",
            para("Visible paragraph text"),
            para("Content control text"),
            para("Visible paragraph"),
        );
        let bytes = build_package(&[("word/document.xml", document_xml(&body).as_bytes())]);
        let text = DocxExtractor::new(ImageOcr::disabled()).extract_bytes(&bytes).unwrap().text;
        assert_eq!(text, "Visible paragraph text\nContent control text");
    }

    #[test]
    fn swept_runs_are_checked_against_earlier_sweeps() {
        // Two text boxes: the second repeats a fragment of the first
        let body = format!(
            "{}<w:p><w:r><w:txbxContent>{}</w:txbxContent></w:r></w:p><w:p><w:r><w:txbxContent>{}</w:txbxContent></w:r></w:p>",
            para("Body paragraph here"),
            para("Shipping address: 12 Harbour Road"),
            para("12 Harbour Road"),
        );
        let bytes = build_package(&[("word/document.xml", document_xml(&body).as_bytes())]);
        let text = DocxExtractor::new(ImageOcr::disabled()).extract_bytes(&bytes).unwrap().text;
        assert_eq!(text, "Body paragraph here\nShipping address: 12 Harbour Road");
    }

    #[test]
    fn sources_follow_body_table_header_footer_sweep_order() {
        let body = format!(
            "{}<w:tbl><w:tr><w:tc>{}</w:tc><w:tc>{}</w:tc></w:tr></w:tbl><w:sdt><w:sdtContent>{}</w:sdtContent></w:sdt>",
            para("Opening paragraph"),
            para("Left cell"),
            para("Right cell"),
            para("Control text"),
        );
        let header = format!(r#"<w:hdr {W_NS}>{}</w:hdr>"#, para("Running header"));
        let footer = format!(r#"<w:ftr {W_NS}>{}</w:ftr>"#, para("Running footer"));
        let rels = rels(&[("rId1", "header", "header1.xml"), ("rId2", "footer", "footer1.xml")]);
        let bytes = build_package(&[
            ("word/document.xml", document_xml(&body).as_bytes()),
            ("word/_rels/document.xml.rels", rels.as_bytes()),
            ("word/header1.xml", header.as_bytes()),
            ("word/footer1.xml", footer.as_bytes()),
        ]);

        let text = DocxExtractor::new(ImageOcr::disabled()).extract_bytes(&bytes).unwrap().text;
        assert_eq!(
            text,
            "Opening paragraph\nLeft cell | Right cell\nRunning header\nRunning footer\nControl text"
        );
    }

    #[test]
    fn ocr_runs_on_embedded_raster_images_only() {
        let engine = CountingEngine::new("Scanned signature block");
        let ocr = ImageOcr::new(Some(engine.clone()));
        let rels = rels(&[
            ("rId7", "image", "media/image1.png"),
            ("rId8", "image", "media/image2.wmf"),
            ("rId9", "image", "media/image3.png"),
        ]);
        let big = png_bytes(80, 60);
        let small = png_bytes(16, 16);
        let bytes = build_package(&[
            ("word/document.xml", document_xml(&para("Body text here")).as_bytes()),
            ("word/_rels/document.xml.rels", rels.as_bytes()),
            ("word/media/image1.png", &big),
            ("word/media/image2.wmf", b"\xd7\xcd\xc6\x9a\x00\x00wmf"),
            ("word/media/image3.png", &small),
        ]);

        let result = DocxExtractor::new(ocr).extract_bytes(&bytes).unwrap();
        assert_eq!(result.text, "Body text here\nScanned signature block");
        assert_eq!(result.count_by(Provenance::Ocr), 1);
        assert_eq!(engine.call_count(), 1);
    }

    #[test]
    fn missing_main_part_is_an_error() {
        let bytes = build_package(&[("word/styles.xml", b"<styles/>")]);
        assert!(DocxExtractor::new(ImageOcr::disabled()).extract_bytes(&bytes).is_err());
    }
}
