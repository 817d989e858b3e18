//! PDF text extraction

use super::{normalize_whitespace, ParsedDocument};
use crate::error::{Error, Result};

/// Extract the text layer of a PDF
#[cfg(feature = "pdf")]
pub fn parse_pdf(data: &[u8]) -> Result<ParsedDocument> {
    let text = pdf_extract::extract_text_from_mem(data)
        .map_err(|e| Error::Parse(format!("failed to read PDF: {}", e)))?;
    Ok(ParsedDocument::new(normalize_whitespace(&text)))
}

/// Extract the text layer of a PDF
#[cfg(not(feature = "pdf"))]
pub fn parse_pdf(_data: &[u8]) -> Result<ParsedDocument> {
    Err(Error::Parse(
        "PDF support is not enabled in this build (feature \"pdf\")".to_string(),
    ))
}

/// A one-page PDF showing `text` in Helvetica
#[cfg(test)]
pub(crate) fn sample_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 712 Td ({}) Tj ET", text);
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref = pdf.len();
    let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        tail.push_str(&format!("{:010} 00000 n \n", offset));
    }
    tail.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    ));
    pdf.extend_from_slice(tail.as_bytes());
    pdf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_pdf_is_parse_error() {
        let result = parse_pdf(b"%PDF-1.4 definitely not a real pdf");
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn test_text_layer_is_extracted() {
        let doc = parse_pdf(&sample_pdf("Quarterly revenue grew")).unwrap();
        for word in ["Quarterly", "revenue", "grew"] {
            assert!(doc.text.contains(word), "missing {} in {:?}", word, doc.text);
        }
    }
}
