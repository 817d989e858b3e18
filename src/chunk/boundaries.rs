//! Unit detection and merging for the splitters
//!
//! Text is first broken into units at one granularity (paragraph, sentence,
//! word, delimiter match). Units are then packed greedily into segments of at
//! most `max_chars` characters, carrying a tail of whole units forward as
//! overlap. A unit that alone exceeds the limit is handed to the next finer
//! granularity.

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Granularity used to break text into units
#[derive(Debug, Clone)]
pub enum Granularity {
    Paragraph,
    Sentence,
    Word,
    Delimiter(Regex),
    /// Hard cut every `max_chars` characters; always terminates the descent
    Character,
}

impl Granularity {
    /// String placed between units when they are packed into one segment
    pub fn joiner(&self) -> &'static str {
        match self {
            Granularity::Paragraph => "\n\n",
            Granularity::Sentence | Granularity::Word | Granularity::Delimiter(_) => " ",
            Granularity::Character => "",
        }
    }

    /// Granularity used for a unit that does not fit on its own
    pub fn finer(&self) -> Granularity {
        match self {
            Granularity::Paragraph => Granularity::Sentence,
            Granularity::Sentence => Granularity::Word,
            Granularity::Delimiter(_) => Granularity::Word,
            Granularity::Word | Granularity::Character => Granularity::Character,
        }
    }

    /// Break text into trimmed, non-empty units
    pub fn units(&self, text: &str, max_chars: usize) -> Vec<String> {
        match self {
            Granularity::Paragraph => paragraphs(text),
            Granularity::Sentence => text
                .split_sentence_bounds()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Granularity::Word => text.split_whitespace().map(str::to_string).collect(),
            Granularity::Delimiter(re) => re
                .split(text)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            Granularity::Character => char_windows(text.trim(), max_chars, max_chars),
        }
    }
}

/// Paragraphs are runs of non-blank lines
fn paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }

    paragraphs
}

/// Count characters (not bytes)
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Fixed-size character windows advancing by `step` characters
pub fn char_windows(text: &str, size: usize, step: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }

    let step = step.max(1);
    let mut windows = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        if !window.trim().is_empty() {
            windows.push(window);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    windows
}

/// Split text at `granularity` and pack the units into segments
pub fn split_units(
    text: &str,
    granularity: &Granularity,
    max_chars: usize,
    overlap_chars: usize,
) -> Vec<String> {
    let units = granularity.units(text, max_chars);
    if matches!(granularity, Granularity::Character) {
        return units;
    }

    let joiner = granularity.joiner();
    let joiner_len = char_len(joiner);
    let mut segments = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for unit in units {
        let unit_len = char_len(&unit);

        if unit_len > max_chars {
            if !current.is_empty() {
                segments.push(current.join(joiner));
                current.clear();
            }
            segments.extend(split_units(
                &unit,
                &granularity.finer(),
                max_chars,
                overlap_chars,
            ));
            continue;
        }

        if !current.is_empty() && packed_len(&current, joiner_len) + joiner_len + unit_len > max_chars
        {
            segments.push(current.join(joiner));
            current = overlap_tail(&current, joiner_len, overlap_chars);
            while !current.is_empty()
                && packed_len(&current, joiner_len) + joiner_len + unit_len > max_chars
            {
                current.remove(0);
            }
        }

        current.push(unit);
    }

    if !current.is_empty() {
        segments.push(current.join(joiner));
    }

    segments
}

fn packed_len(units: &[String], joiner_len: usize) -> usize {
    let text_len: usize = units.iter().map(|u| char_len(u)).sum();
    text_len + joiner_len * units.len().saturating_sub(1)
}

/// Longest suffix of whole units that fits within `overlap_chars`
fn overlap_tail(units: &[String], joiner_len: usize, overlap_chars: usize) -> Vec<String> {
    let mut tail: Vec<String> = Vec::new();
    let mut len = 0;

    for unit in units.iter().rev() {
        let added = char_len(unit) + if tail.is_empty() { 0 } else { joiner_len };
        if len + added > overlap_chars {
            break;
        }
        len += added;
        tail.insert(0, unit.clone());
    }

    tail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraph_units() {
        let units = Granularity::Paragraph.units("First para.\n\n  \nSecond para.\n \nThird.", 100);
        assert_eq!(units, vec!["First para.", "Second para.", "Third."]);
    }

    #[test]
    fn test_sentence_units() {
        let units = Granularity::Sentence.units("One is here. Two is there! Three?", 100);
        assert_eq!(units, vec!["One is here.", "Two is there!", "Three?"]);
    }

    #[test]
    fn test_char_windows_with_step() {
        let windows = char_windows("abcdefghij", 4, 3);
        assert_eq!(windows, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_char_windows_multibyte() {
        let windows = char_windows("héllo wörld", 5, 5);
        assert_eq!(windows, vec!["héllo", " wörl", "d"]);
    }

    #[test]
    fn test_packing_respects_limit() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let segments = split_units(text, &Granularity::Word, 16, 0);
        assert!(segments.iter().all(|s| char_len(s) <= 16));
        assert_eq!(segments.join(" "), text);
    }

    #[test]
    fn test_overlap_carries_whole_units() {
        let segments = split_units("aa bb cc dd ee", &Granularity::Word, 8, 2);
        assert_eq!(segments, vec!["aa bb cc", "cc dd ee"]);
    }

    #[test]
    fn test_oversized_unit_descends() {
        let text = format!("short.\n\n{}", "x".repeat(25));
        let segments = split_units(&text, &Granularity::Paragraph, 10, 0);
        assert_eq!(segments[0], "short.");
        assert_eq!(segments[1..], ["xxxxxxxxxx", "xxxxxxxxxx", "xxxxx"]);
    }

    #[test]
    fn test_delimiter_units() {
        let re = Regex::new(r"-{3,}").unwrap();
        let units = Granularity::Delimiter(re).units("one ---- two --- three", 100);
        assert_eq!(units, vec!["one", "two", "three"]);
    }
}
