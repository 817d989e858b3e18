//! Document parsing and text extraction
//!
//! This module handles:
//! - Mapping a file type to one of a fixed set of parsers
//! - Plain text, markdown, PDF and office extraction
//! - The HTML-to-text transform applied after parsing HTML sources
//! - Binary detection and whitespace normalization

mod html;
mod markdown;
mod office;
mod pdf;
mod text;

pub use html::*;
pub use markdown::*;
pub use office::*;
pub use pdf::*;
pub use text::*;

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Parser selected for a file type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    /// Plain text and HTML-like sources
    Text,
    Markdown,
    Pdf,
    /// doc/xls/ppt families
    Office,
    /// Best effort by guessed MIME type
    Generic,
}

impl ParserKind {
    /// Select a parser by file type (extension, case-insensitive)
    pub fn for_file_type(file_type: &str) -> Self {
        match normalize_file_type(file_type).as_str() {
            "txt" | "text" | "html" | "htm" => ParserKind::Text,
            "md" | "markdown" => ParserKind::Markdown,
            "pdf" => ParserKind::Pdf,
            "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" => ParserKind::Office,
            _ => ParserKind::Generic,
        }
    }
}

impl std::fmt::Display for ParserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParserKind::Text => write!(f, "text"),
            ParserKind::Markdown => write!(f, "markdown"),
            ParserKind::Pdf => write!(f, "pdf"),
            ParserKind::Office => write!(f, "office"),
            ParserKind::Generic => write!(f, "generic"),
        }
    }
}

/// Whether parsed output goes through the HTML-to-text transform
pub fn needs_html_transform(file_type: &str) -> bool {
    matches!(normalize_file_type(file_type).as_str(), "html" | "htm")
}

/// Lowercased extension without a leading dot
pub fn normalize_file_type(file_type: &str) -> String {
    file_type.trim().trim_start_matches('.').to_lowercase()
}

/// File type of a path, taken from its extension
pub fn file_type_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(normalize_file_type)
}

/// Parsed document: extracted text plus mutable metadata
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Extracted title (if found)
    pub title: Option<String>,

    /// Main text content
    pub text: String,

    /// Metadata copied onto every segment split from this document
    pub metadata: Map<String, Value>,
}

impl ParsedDocument {
    pub fn new(text: String) -> Self {
        Self {
            title: None,
            text,
            metadata: Map::new(),
        }
    }

    /// Fail when no text survived extraction
    fn non_blank(self) -> Result<Self> {
        if self.text.trim().is_empty() {
            return Err(Error::Parse("document has no extractable text".to_string()));
        }
        Ok(self)
    }
}

/// Parse a file with the parser selected for `file_type`.
///
/// This does blocking IO and CPU-heavy extraction; async callers run it on the
/// blocking pool.
pub fn parse_file(path: &Path, file_type: &str) -> Result<ParsedDocument> {
    let kind = ParserKind::for_file_type(file_type);

    let doc = match kind {
        ParserKind::Text => parse_plain_text(&std::fs::read(path)?)?,
        ParserKind::Markdown => parse_markdown(&read_utf8(&std::fs::read(path)?)?)?,
        ParserKind::Pdf => parse_pdf(&std::fs::read(path)?)?,
        ParserKind::Office => parse_office(path, &normalize_file_type(file_type))?,
        ParserKind::Generic => parse_generic(&std::fs::read(path)?, file_type)?,
    };

    let doc = if needs_html_transform(file_type) {
        html_to_text(doc)
    } else {
        doc
    };

    let mut doc = doc.non_blank()?;
    if let Some(ref title) = doc.title {
        doc.metadata
            .insert("title".to_string(), Value::from(title.clone()));
    }
    Ok(doc)
}

/// Best-effort parsing for file types without a dedicated parser
pub fn parse_generic(data: &[u8], file_type: &str) -> Result<ParsedDocument> {
    let mime = mime_guess::from_ext(&normalize_file_type(file_type)).first_or_octet_stream();

    if is_binary_content(data) {
        return Err(Error::Parse(format!(
            "unsupported binary content (type '{}', {})",
            file_type, mime
        )));
    }

    let doc = parse_plain_text(data)?;
    if mime.subtype() == mime_guess::mime::HTML {
        Ok(html_to_text(doc))
    } else {
        Ok(doc)
    }
}

fn read_utf8(data: &[u8]) -> Result<String> {
    if is_binary_content(data) {
        return Err(Error::Parse("binary content where text was expected".to_string()));
    }
    Ok(String::from_utf8_lossy(data).into_owned())
}

/// Check if content appears to be binary
pub fn is_binary_content(data: &[u8]) -> bool {
    // Check for null bytes in the first 8KB
    let check_len = std::cmp::min(data.len(), 8192);
    data[..check_len].iter().any(|&b| b == 0)
}

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_was_whitespace = true;
    let mut newline_count = 0;

    for c in text.chars() {
        if c.is_whitespace() {
            if c == '\n' {
                newline_count += 1;
            }
            last_was_whitespace = true;
        } else {
            if last_was_whitespace && !result.is_empty() {
                if newline_count >= 2 {
                    // Paragraph break
                    result.push_str("\n\n");
                } else if newline_count == 1 {
                    result.push('\n');
                } else {
                    result.push(' ');
                }
            }
            newline_count = 0;
            result.push(c);
            last_was_whitespace = false;
        }
    }

    result.trim().to_string()
}
