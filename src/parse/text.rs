//! Plain text parsing

use super::{is_binary_content, normalize_whitespace, ParsedDocument};
use crate::error::{Error, Result};

/// Parse plain text content; binary data is rejected
pub fn parse_plain_text(data: &[u8]) -> Result<ParsedDocument> {
    if is_binary_content(data) {
        return Err(Error::Parse(
            "binary content cannot be parsed as plain text".to_string(),
        ));
    }

    let content = String::from_utf8_lossy(data);
    let text = normalize_whitespace(content.trim_start_matches('\u{feff}'));

    // Try to extract a title from the first line
    let title = text.lines().next().and_then(|line| {
        let trimmed = line.trim();
        if trimmed.len() < 100 && !trimmed.is_empty() {
            Some(trimmed.to_string())
        } else {
            None
        }
    });

    let mut doc = ParsedDocument::new(text);
    doc.title = title;
    Ok(doc)
}
