//! Direct text extraction for documents that already carry a text layer:
//! DOCX and text-bearing PDFs (§4.2). No OCR, no network calls, confidence
//! is always 1.0 — the text is exactly what the source encodes.

use std::fs::File;
use std::io::Read as _;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use cv_common::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub has_embedded_images: bool,
    pub confidence: f32,
}

/// Extract paragraphs, table cells, and header/footer text from a `.docx`
/// file in document order (headers, body, footers).
pub fn extract_docx(path: &Path) -> Result<ExtractedDocument> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| PipelineError::Provider {
        provider: "docx".into(),
        message: format!("not a valid zip archive: {e}"),
    })?;

    let has_embedded_images = (0..archive.len()).any(|i| {
        archive
            .by_index(i)
            .map(|entry| entry.name().starts_with("word/media/"))
            .unwrap_or(false)
    });

    let mut parts = Vec::new();
    for name in part_names(&archive, "word/header") {
        if let Some(text) = read_part_text(&mut archive, &name)? {
            parts.push(text);
        }
    }
    if let Some(text) = read_part_text(&mut archive, "word/document.xml")? {
        parts.push(text);
    }
    for name in part_names(&archive, "word/footer") {
        if let Some(text) = read_part_text(&mut archive, &name)? {
            parts.push(text);
        }
    }

    let text = parts.join("\n");
    if text.trim().is_empty() {
        return Err(PipelineError::NoText);
    }

    Ok(ExtractedDocument {
        text,
        has_embedded_images,
        confidence: 1.0,
    })
}

fn part_names(archive: &ZipArchive<File>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

fn read_part_text(archive: &mut ZipArchive<File>, name: &str) -> Result<Option<String>> {
    let mut xml = String::new();
    {
        let Ok(mut entry) = archive.by_name(name) else {
            return Ok(None);
        };
        entry.read_to_string(&mut xml).map_err(|e| PipelineError::Provider {
            provider: "docx".into(),
            message: e.to_string(),
        })?;
    }
    Ok(Some(walk_wordprocessing_xml(&xml)))
}

/// Walk a WordprocessingML part (`document.xml`, a header, or a footer),
/// joining paragraphs with newlines and table rows with pipes.
fn walk_wordprocessing_xml(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut out = String::new();
    let mut paragraph = String::new();
    let mut in_table = false;
    let mut row_cells: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_cell = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:tbl" => in_table = true,
                b"w:tr" => row_cells.clear(),
                b"w:tc" => {
                    in_cell = true;
                    cell.clear();
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:tbl" => in_table = false,
                b"w:tr" => {
                    if !row_cells.is_empty() {
                        out.push_str(&row_cells.join(" | "));
                        out.push('\n');
                    }
                }
                b"w:tc" => {
                    in_cell = false;
                    row_cells.push(std::mem::take(&mut cell));
                }
                b"w:p" if !in_table => {
                    if !paragraph.is_empty() {
                        out.push_str(&paragraph);
                        out.push('\n');
                        paragraph.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default();
                if in_cell {
                    cell.push_str(&text);
                } else if !in_table {
                    paragraph.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    if !paragraph.is_empty() {
        out.push_str(&paragraph);
        out.push('\n');
    }
    out
}

/// Extract text and pipe-joined tables from every page of a text-bearing
/// PDF, in page order.
pub fn extract_pdf_text(path: &Path) -> Result<ExtractedDocument> {
    let doc = lopdf::Document::load(path).map_err(|e| PipelineError::Provider {
        provider: "lopdf".into(),
        message: e.to_string(),
    })?;

    let mut pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    pages.sort_unstable();

    let mut out = String::new();
    for page_num in pages {
        let page_id = doc.get_pages()[&page_num];
        if let Ok(text) = doc.extract_text(&[page_id]) {
            out.push_str(&text);
            out.push('\n');
        }
    }

    if out.trim().is_empty() {
        return Err(PipelineError::NoText);
    }

    Ok(ExtractedDocument {
        text: out,
        has_embedded_images: false,
        confidence: 1.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_wordprocessing_xml_joins_paragraphs_with_newlines() {
        let xml = r#"<w:document xmlns:w="ns"><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r></w:p>
            <w:p><w:r><w:t>World</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = walk_wordprocessing_xml(xml);
        assert_eq!(text.trim(), "Hello\nWorld");
    }

    #[test]
    fn walk_wordprocessing_xml_pipe_joins_table_rows() {
        let xml = r#"<w:document xmlns:w="ns"><w:body>
            <w:tbl>
                <w:tr><w:tc><w:p><w:r><w:t>Name</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Skill</w:t></w:r></w:p></w:tc></w:tr>
                <w:tr><w:tc><w:p><w:r><w:t>Maria</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Rust</w:t></w:r></w:p></w:tc></w:tr>
            </w:tbl>
        </w:body></w:document>"#;
        let text = walk_wordprocessing_xml(xml);
        assert!(text.contains("Name | Skill"));
        assert!(text.contains("Maria | Rust"));
    }

    #[test]
    fn extract_docx_missing_file_errors() {
        let result = extract_docx(Path::new("/nonexistent/path.docx"));
        assert!(result.is_err());
    }

    #[test]
    fn extract_pdf_text_missing_file_errors() {
        let result = extract_pdf_text(Path::new("/nonexistent/path.pdf"));
        assert!(result.is_err());
    }
}
