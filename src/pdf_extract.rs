// src/pdf_extract.rs

use crate::config::ExtractionSection;
use crate::error::{IntakeError, Result};
use crate::heuristics::{self, PcInfo};
use lopdf::Document;
use tracing::{info, warn};

/// Result of attempting to extract text from a PDF.
#[derive(Debug)]
pub enum PdfContent {
    /// Page texts, in page order.
    Text(Vec<String>),
    /// The PDF appears to be scanned / image-only. OCR is out of scope.
    ScannedImage,
    /// The bytes could not be parsed as a PDF.
    Error(String),
}

/// Main entry point: takes raw PDF bytes and returns `PdfContent`.
pub fn extract_text_from_pdf(pdf_bytes: &[u8], cfg: &ExtractionSection) -> PdfContent {
    // --- Phase 1: structural check with lopdf ---
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return PdfContent::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_like_scanned(&doc, cfg.scanned_ratio) {
        info!("PDF structural check: likely scanned / image-only");
        return PdfContent::ScannedImage;
    }

    // --- Phase 2: per-page text extraction ---
    match pdf_extract::extract_text_from_mem_by_pages(pdf_bytes) {
        Ok(pages) => {
            let meaningful = pages
                .iter()
                .flat_map(|p| p.chars())
                .filter(|c| !c.is_whitespace())
                .count();
            if meaningful == 0 {
                info!("No text extracted, treating as scanned");
                PdfContent::ScannedImage
            } else {
                info!(chars = meaningful, pages = pages.len(), "Text extracted successfully");
                PdfContent::Text(pages)
            }
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed, may be scanned or corrupted");
            PdfContent::ScannedImage
        }
    }
}

/// Importer and fees of a payment-confirmation PDF.
///
/// Scanned documents give an empty `PcInfo`; bytes that are not a PDF are
/// a processing error.
pub fn pc_info_from_pdf(pdf_bytes: &[u8], cfg: &ExtractionSection) -> Result<PcInfo> {
    let text = match extract_text_from_pdf(pdf_bytes, cfg) {
        PdfContent::Text(pages) => pages.join("\n"),
        PdfContent::ScannedImage => return Ok(PcInfo::default()),
        PdfContent::Error(msg) => return Err(IntakeError::processing(msg)),
    };
    let info = heuristics::extract_pc_info(&text);
    info!(
        importer = ?info.importer,
        fees = info.fees.len(),
        structured = info.structured_fees(),
        "PC info extracted"
    );
    Ok(info)
}

/// Heuristic: inspect the PDF object tree for signs that every page
/// is just a single image with no text operators.
///
/// We look at each page's `Resources` dictionary. If a page has
/// XObject images but **no** Font resources, it's almost certainly
/// a scanned page.
fn looks_like_scanned(doc: &Document, threshold: f64) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // Can't tell, let text extraction try
    }

    let mut image_only_pages = 0;

    for object_id in pages.values() {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Some(page_dict) = page_obj.as_dict().ok() else {
            continue;
        };

        let resources = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok());

        let has_entry = |key: &[u8]| {
            resources
                .and_then(|res| res.get(key).ok())
                .and_then(|f| doc.dereference(f).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
                .is_some_and(|d| !d.is_empty())
        };

        if has_entry(&b"XObject"[..]) && !has_entry(&b"Font"[..]) {
            image_only_pages += 1;
        }
    }

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= threshold
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Dictionary, Object, Stream};

    /// Build a PDF with one Helvetica text page per entry in `page_texts`.
    pub(crate) fn sample_pdf(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        let resources_id = doc.add_object(Dictionary::from_iter([(
            "Font",
            Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
        )]));

        let mut kids = Vec::new();
        for text in page_texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 18.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page_id = doc.add_object(Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Reference(resources_id)),
                (
                    "MediaBox",
                    Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
                ),
            ]));
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(kids)),
                ("Count", Object::Integer(count)),
            ])),
        );
        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    pub(crate) fn page_count(pdf_bytes: &[u8]) -> lopdf::Result<usize> {
        Ok(Document::load_mem(pdf_bytes)?.get_pages().len())
    }

    #[test]
    fn test_garbage_bytes() {
        let result = extract_text_from_pdf(b"this is not a pdf", &ExtractionSection::default());
        assert!(matches!(result, PdfContent::Error(ref msg) if msg.contains("Failed to parse PDF")));
    }

    #[test]
    fn test_garbage_bytes_is_processing_error_for_pc_info() {
        let err = pc_info_from_pdf(b"definitely not a pdf", &ExtractionSection::default())
            .unwrap_err();
        assert!(matches!(err, IntakeError::Processing(ref msg) if msg.contains("Failed to parse PDF")));
        assert_eq!(err.public_message(), crate::error::GENERIC_FAILURE);
    }

    #[test]
    fn test_pages_extracted_in_order() {
        let pdf = sample_pdf(&[
            "First page of the shipment settlement",
            "Second page with the remaining fee lines",
        ]);
        let content = extract_text_from_pdf(&pdf, &ExtractionSection::default());
        let PdfContent::Text(pages) = content else {
            panic!("expected text, got {content:?}");
        };
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("First page"));
        assert!(pages[1].contains("Second page"));
    }

    #[test]
    fn test_short_text_is_still_text() {
        let pdf = sample_pdf(&["ACME 15,000 VENDOR"]);
        let content = extract_text_from_pdf(&pdf, &ExtractionSection::default());
        let PdfContent::Text(pages) = content else {
            panic!("expected text, got {content:?}");
        };
        assert!(pages[0].contains("ACME 15,000 VENDOR"));
        assert!(pc_info_from_pdf(&pdf, &ExtractionSection::default()).is_ok());
    }

    #[test]
    fn test_no_text_counts_as_scanned() {
        let pdf = sample_pdf(&[""]);
        let content = extract_text_from_pdf(&pdf, &ExtractionSection::default());
        assert!(matches!(content, PdfContent::ScannedImage));
        assert_eq!(
            pc_info_from_pdf(&pdf, &ExtractionSection::default()).unwrap(),
            PcInfo::default()
        );
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(&sample_pdf(&["a", "b", "c"])).unwrap(), 3);
        assert!(page_count(b"not a pdf at all").is_err());
    }
}
