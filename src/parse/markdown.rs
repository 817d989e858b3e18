//! Markdown parsing and text extraction

use super::ParsedDocument;
use crate::error::Result;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

/// Parse Markdown content into plain text.
///
/// Block elements (headings, paragraphs, code blocks, list items) end up
/// separated by blank lines so paragraph splitting sees the document
/// structure; inline markup is dropped.
pub fn parse_markdown(content: &str) -> Result<ParsedDocument> {
    let parser = Parser::new(content);

    let mut title: Option<String> = None;
    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut heading: Option<(HeadingLevel, String)> = None;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                flush(&mut blocks, &mut current);
                heading = Some((level, String::new()));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, text)) = heading.take() {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        if title.is_none() && level == HeadingLevel::H1 {
                            title = Some(text.clone());
                        }
                        blocks.push(text);
                    }
                }
            }
            Event::Text(text) | Event::Code(text) => match heading {
                Some((_, ref mut heading_text)) => heading_text.push_str(&text),
                None => current.push_str(&text),
            },
            Event::SoftBreak | Event::HardBreak => match heading {
                Some((_, ref mut heading_text)) => heading_text.push(' '),
                None => current.push('\n'),
            },
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::CodeBlock)
            | Event::End(TagEnd::Item)
            | Event::Rule => flush(&mut blocks, &mut current),
            _ => {}
        }
    }
    flush(&mut blocks, &mut current);

    let mut doc = ParsedDocument::new(blocks.join("\n\n"));
    doc.title = title;
    Ok(doc)
}

fn flush(blocks: &mut Vec<String>, current: &mut String) {
    let block = current.trim();
    if !block.is_empty() {
        blocks.push(block.to_string());
    }
    current.clear();
}
