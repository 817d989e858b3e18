//! HTML-to-text transform

use super::{normalize_whitespace, ParsedDocument};
use scraper::{Html, Selector};

/// Replace a document's HTML markup with its readable text.
///
/// Applied after the text parser has read an HTML source verbatim. Metadata is
/// kept; the title comes from `<title>` (or the first `<h1>`) when present.
pub fn html_to_text(mut doc: ParsedDocument) -> ParsedDocument {
    let document = Html::parse_document(&doc.text);

    if let Some(title) = first_text(&document, "title").or_else(|| first_text(&document, "h1")) {
        doc.title = Some(title);
    }

    let body_selector = Selector::parse("body").ok();
    let root = body_selector
        .as_ref()
        .and_then(|s| document.select(s).next())
        .map(|e| e.html())
        .unwrap_or_else(|| doc.text.clone());

    let text = html2text::from_read(root.as_bytes(), 80).unwrap_or_else(|_| root.clone());
    doc.text = normalize_whitespace(&text);
    doc
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|elem| elem.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn html_doc(content: &str) -> ParsedDocument {
        ParsedDocument::new(content.to_string())
    }

    #[test]
    fn test_html_to_text() {
        let doc = html_to_text(html_doc(
            r#"<html><head><title>Test Page</title></head>
            <body><h1>Main Heading</h1><p>Some paragraph text.</p></body></html>"#,
        ));

        assert_eq!(doc.title, Some("Test Page".to_string()));
        assert!(doc.text.contains("Main Heading"));
        assert!(doc.text.contains("Some paragraph text."));
        assert!(!doc.text.contains("<p>"));
    }

    #[test]
    fn test_title_falls_back_to_h1() {
        let doc = html_to_text(html_doc("<body><h1>Only Heading</h1><p>Body</p></body>"));
        assert_eq!(doc.title, Some("Only Heading".to_string()));
    }

    #[test]
    fn test_metadata_survives_transform() {
        let mut doc = html_doc("<p>hello</p>");
        doc.metadata
            .insert("source_file_id".to_string(), serde_json::Value::from("f-1"));
        let doc = html_to_text(doc);
        assert_eq!(doc.metadata["source_file_id"], "f-1");
    }
}
