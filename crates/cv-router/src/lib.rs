//! Document routing: classify an uploaded file into the extraction path
//! that should handle it (§4.1).
use std::path::Path;
use tracing::{debug, info};

use cv_common::{PipelineError, Result};

const SAMPLE_PAGES: u32 = 3;
const TEXT_PDF_MIN_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Docx,
    PdfText,
    PdfScanned,
    Image,
    Unsupported,
}

impl DocumentType {
    #[must_use]
    pub fn needs_ocr(self) -> bool {
        matches!(self, DocumentType::PdfScanned | DocumentType::Image)
    }
}

/// Classify `path` by extension, sampling the first pages of a PDF via a
/// direct text extraction pass to distinguish a text layer from a scan.
pub fn classify(path: &Path) -> Result<DocumentType> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    debug!(path = %path.display(), extension = %ext, "classifying document");

    let doc_type = match ext.as_str() {
        "docx" => DocumentType::Docx,
        "pdf" => classify_pdf(path)?,
        "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" => DocumentType::Image,
        other => {
            return Err(PipelineError::UnsupportedMedia(other.to_string()));
        }
    };

    info!(path = %path.display(), ?doc_type, "document classified");
    Ok(doc_type)
}

fn classify_pdf(path: &Path) -> Result<DocumentType> {
    let sampled = sample_pdf_text(path, SAMPLE_PAGES)?;
    if sampled.chars().count() >= TEXT_PDF_MIN_CHARS {
        Ok(DocumentType::PdfText)
    } else {
        Ok(DocumentType::PdfScanned)
    }
}

/// Extract text from the first `max_pages` pages of a PDF for sampling
/// purposes only; the full direct extraction path lives in `cv-extract`.
fn sample_pdf_text(path: &Path, max_pages: u32) -> Result<String> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| PipelineError::Provider {
            provider: "lopdf".into(),
            message: e.to_string(),
        })?;

    let mut text = String::new();
    for (i, page_id) in doc.get_pages().values().enumerate() {
        if i as u32 >= max_pages {
            break;
        }
        if let Ok(page_text) = doc.extract_text(&[*page_id]) {
            text.push_str(&page_text);
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn classify_by_extension_docx() {
        assert_eq!(classify(&PathBuf::from("cv.docx")).unwrap(), DocumentType::Docx);
    }

    #[test]
    fn classify_by_extension_image() {
        assert_eq!(classify(&PathBuf::from("scan.png")).unwrap(), DocumentType::Image);
        assert_eq!(classify(&PathBuf::from("scan.JPG")).unwrap(), DocumentType::Image);
    }

    #[test]
    fn classify_unsupported_extension_errors() {
        assert!(classify(&PathBuf::from("cv.rtf")).is_err());
    }

    #[test]
    fn needs_ocr_flags_scanned_and_image_only() {
        assert!(DocumentType::PdfScanned.needs_ocr());
        assert!(DocumentType::Image.needs_ocr());
        assert!(!DocumentType::PdfText.needs_ocr());
        assert!(!DocumentType::Docx.needs_ocr());
    }
}
