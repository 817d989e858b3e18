//! Text splitting into segments
//!
//! A knowledge-base file carries its own [`ProcessOptions`]; the options pick
//! one closed [`Splitter`] variant that turns a parsed document into an
//! ordered list of [`TextSegment`]s, each inheriting the document metadata.

mod boundaries;

pub use boundaries::*;

use crate::config::{default_chunk_size, default_overlap_size};
use crate::error::{Error, Result};
use crate::parse::ParsedDocument;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Chunking strategy tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    Paragraph,
    Sentence,
    /// Fixed character windows
    Length,
    #[default]
    Word,
    CustomDelimiter,
}

impl std::fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkStrategy::Paragraph => write!(f, "paragraph"),
            ChunkStrategy::Sentence => write!(f, "sentence"),
            ChunkStrategy::Length => write!(f, "length"),
            ChunkStrategy::Word => write!(f, "word"),
            ChunkStrategy::CustomDelimiter => write!(f, "custom_delimiter"),
        }
    }
}

impl FromStr for ChunkStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "paragraph" => Ok(ChunkStrategy::Paragraph),
            "sentence" => Ok(ChunkStrategy::Sentence),
            "length" => Ok(ChunkStrategy::Length),
            "word" | "default" => Ok(ChunkStrategy::Word),
            "custom_delimiter" | "custom" => Ok(ChunkStrategy::CustomDelimiter),
            _ => Err(Error::Validation(format!("Unknown chunk strategy: {}", s))),
        }
    }
}

/// Chunking options recorded with each file added to a knowledge base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOptions {
    #[serde(default)]
    pub strategy: ChunkStrategy,

    /// Maximum characters per segment
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters of trailing context repeated at the start of the next segment
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,

    /// Regex delimiter, required by the custom-delimiter strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            chunk_size: default_chunk_size(),
            overlap_size: default_overlap_size(),
            delimiter: None,
        }
    }
}

impl ProcessOptions {
    pub fn validate(&self) -> Result<()> {
        Splitter::from_options(self).map(|_| ())
    }
}

/// A split unit of text with the metadata it is indexed under
#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// Closed set of splitters, one per strategy
#[derive(Debug, Clone)]
pub enum Splitter {
    Paragraph { max_chars: usize, overlap_chars: usize },
    Sentence { max_chars: usize, overlap_chars: usize },
    Length { max_chars: usize, overlap_chars: usize },
    Word { max_chars: usize, overlap_chars: usize },
    CustomDelimiter {
        delimiter: Regex,
        max_chars: usize,
        overlap_chars: usize,
    },
}

impl Splitter {
    /// Build the splitter for a set of options, validating them
    pub fn from_options(options: &ProcessOptions) -> Result<Self> {
        let max_chars = options.chunk_size;
        let overlap_chars = options.overlap_size;

        if max_chars == 0 {
            return Err(Error::Validation(
                "chunk_size must be positive".to_string(),
            ));
        }
        if overlap_chars >= max_chars {
            return Err(Error::Validation(format!(
                "overlap_size ({}) must be smaller than chunk_size ({})",
                overlap_chars, max_chars
            )));
        }

        Ok(match options.strategy {
            ChunkStrategy::Paragraph => Splitter::Paragraph { max_chars, overlap_chars },
            ChunkStrategy::Sentence => Splitter::Sentence { max_chars, overlap_chars },
            ChunkStrategy::Length => Splitter::Length { max_chars, overlap_chars },
            ChunkStrategy::Word => Splitter::Word { max_chars, overlap_chars },
            ChunkStrategy::CustomDelimiter => {
                let pattern = options
                    .delimiter
                    .as_deref()
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| {
                        Error::Validation(
                            "custom_delimiter strategy requires a delimiter pattern".to_string(),
                        )
                    })?;
                let delimiter = Regex::new(pattern).map_err(|e| {
                    Error::Validation(format!("invalid delimiter pattern '{}': {}", pattern, e))
                })?;
                Splitter::CustomDelimiter {
                    delimiter,
                    max_chars,
                    overlap_chars,
                }
            }
        })
    }

    /// Split raw text into ordered segment texts
    pub fn split_text(&self, text: &str) -> Vec<String> {
        match self {
            Splitter::Paragraph { max_chars, overlap_chars } => {
                split_units(text, &Granularity::Paragraph, *max_chars, *overlap_chars)
            }
            Splitter::Sentence { max_chars, overlap_chars } => {
                split_units(text, &Granularity::Sentence, *max_chars, *overlap_chars)
            }
            Splitter::Length { max_chars, overlap_chars } => {
                char_windows(text.trim(), *max_chars, max_chars - overlap_chars)
            }
            Splitter::Word { max_chars, overlap_chars } => {
                split_units(text, &Granularity::Word, *max_chars, *overlap_chars)
            }
            Splitter::CustomDelimiter {
                delimiter,
                max_chars,
                overlap_chars,
            } => split_units(
                text,
                &Granularity::Delimiter(delimiter.clone()),
                *max_chars,
                *overlap_chars,
            ),
        }
    }

    /// Split a document; every segment carries the document metadata plus its `index`
    pub fn split_document(&self, doc: &ParsedDocument) -> Vec<TextSegment> {
        self.split_text(&doc.text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let mut metadata = doc.metadata.clone();
                metadata.insert("index".to_string(), Value::from(index));
                TextSegment { text, metadata }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(strategy: ChunkStrategy, size: usize, overlap: usize) -> ProcessOptions {
        ProcessOptions {
            strategy,
            chunk_size: size,
            overlap_size: overlap,
            delimiter: None,
        }
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("paragraph".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::Paragraph);
        assert_eq!("custom-delimiter".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::CustomDelimiter);
        assert_eq!("DEFAULT".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::Word);
        assert!("tokens".parse::<ChunkStrategy>().is_err());
    }

    #[test]
    fn test_invalid_options_rejected() {
        assert!(Splitter::from_options(&options(ChunkStrategy::Word, 0, 0)).is_err());
        assert!(Splitter::from_options(&options(ChunkStrategy::Word, 10, 10)).is_err());
        assert!(Splitter::from_options(&options(ChunkStrategy::CustomDelimiter, 10, 0)).is_err());

        let mut custom = options(ChunkStrategy::CustomDelimiter, 10, 0);
        custom.delimiter = Some("(unclosed".to_string());
        assert!(matches!(
            Splitter::from_options(&custom),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_paragraph_splitter_keeps_paragraphs_together() {
        let splitter = Splitter::from_options(&options(ChunkStrategy::Paragraph, 40, 0)).unwrap();
        let text = "First paragraph here.\n\nSecond one.\n\nA third paragraph that is longer.";
        let segments = splitter.split_text(text);
        assert_eq!(
            segments,
            vec![
                "First paragraph here.\n\nSecond one.",
                "A third paragraph that is longer.",
            ]
        );
    }

    #[test]
    fn test_sentence_splitter() {
        let splitter = Splitter::from_options(&options(ChunkStrategy::Sentence, 20, 0)).unwrap();
        let segments = splitter.split_text("Cats purr. Dogs bark loudly. Fish swim.");
        assert_eq!(segments, vec!["Cats purr.", "Dogs bark loudly.", "Fish swim."]);
    }

    #[test]
    fn test_length_splitter_overlaps() {
        let splitter = Splitter::from_options(&options(ChunkStrategy::Length, 4, 1)).unwrap();
        assert_eq!(splitter.split_text("abcdefghij"), vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_custom_delimiter_splitter() {
        let mut opts = options(ChunkStrategy::CustomDelimiter, 12, 0);
        opts.delimiter = Some(r"\s*;\s*".to_string());
        let splitter = Splitter::from_options(&opts).unwrap();
        assert_eq!(
            splitter.split_text("alpha; beta;gamma ; delta"),
            vec!["alpha beta", "gamma delta"]
        );
    }

    #[test]
    fn test_blank_text_has_no_segments() {
        let splitter = Splitter::from_options(&ProcessOptions::default()).unwrap();
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn test_split_document_copies_metadata() {
        let mut doc = ParsedDocument::new("one two three four".to_string());
        doc.metadata
            .insert("indexed_file_id".to_string(), Value::from("file-1"));

        let splitter = Splitter::from_options(&options(ChunkStrategy::Word, 10, 0)).unwrap();
        let segments = splitter.split_document(&doc);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "one two");
        assert_eq!(segments[1].metadata["indexed_file_id"], "file-1");
        assert_eq!(segments[1].metadata["index"], 1);
    }
}
