//! Office document extraction (Word, Excel, PowerPoint)

use super::{normalize_whitespace, ParsedDocument};
use crate::error::{Error, Result};
use calamine::{open_workbook_auto, Data, Reader};
use regex::Regex;
use std::io::Read;
use std::path::Path;

/// Extract text from an office document; `file_type` is the normalized extension
pub fn parse_office(path: &Path, file_type: &str) -> Result<ParsedDocument> {
    let text = match file_type {
        "docx" => docx_text(path)?,
        "xls" | "xlsx" => spreadsheet_text(path)?,
        "pptx" => pptx_text(path)?,
        "doc" | "ppt" => {
            return Err(Error::Parse(format!(
                "legacy binary .{} documents are not supported; convert to the OOXML format",
                file_type
            )))
        }
        other => {
            return Err(Error::Parse(format!(
                "not an office document type: {}",
                other
            )))
        }
    };

    Ok(ParsedDocument::new(normalize_whitespace(&text)))
}

fn docx_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let doc = docx_rs::read_docx(&bytes)
        .map_err(|e| Error::Parse(format!("failed to read DOCX: {}", e)))?;

    let mut text = String::new();
    for child in &doc.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(p) => {
                paragraph_text(p, &mut text);
                text.push_str("\n\n");
            }
            docx_rs::DocumentChild::Table(table) => {
                table_text(table, &mut text);
                text.push_str("\n\n");
            }
            _ => {}
        }
    }

    Ok(text)
}

fn paragraph_text(p: &docx_rs::Paragraph, text: &mut String) {
    for child in &p.children {
        match child {
            docx_rs::ParagraphChild::Run(run) => run_text(run, text),
            docx_rs::ParagraphChild::Hyperlink(link) => {
                for child in &link.children {
                    if let docx_rs::ParagraphChild::Run(run) = child {
                        run_text(run, text);
                    }
                }
            }
            _ => {}
        }
    }
}

fn run_text(run: &docx_rs::Run, text: &mut String) {
    for child in &run.children {
        match child {
            docx_rs::RunChild::Text(t) => text.push_str(&t.text),
            docx_rs::RunChild::Tab(_) => text.push('\t'),
            docx_rs::RunChild::Break(_) => text.push('\n'),
            _ => {}
        }
    }
}

fn table_text(table: &docx_rs::Table, text: &mut String) {
    for row in &table.rows {
        let docx_rs::TableChild::TableRow(tr) = row;
        let cells: Vec<String> = tr
            .cells
            .iter()
            .map(|cell| {
                let docx_rs::TableRowChild::TableCell(tc) = cell;
                let mut cell_text = String::new();
                for content in &tc.children {
                    if let docx_rs::TableCellContent::Paragraph(p) = content {
                        paragraph_text(p, &mut cell_text);
                    }
                }
                cell_text.trim().to_string()
            })
            .collect();
        if !cells.is_empty() {
            text.push_str(&cells.join(" | "));
            text.push('\n');
        }
    }
}

fn spreadsheet_text(path: &Path) -> Result<String> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| Error::Parse(format!("failed to open workbook: {}", e)))?;

    let mut text = String::new();
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

    for sheet_name in sheet_names {
        text.push_str(&sheet_name);
        text.push_str("\n\n");

        if let Ok(range) = workbook.worksheet_range(&sheet_name) {
            for row in range.rows() {
                let cells: Vec<String> = row.iter().map(cell_text).collect();
                if cells.iter().all(|c| c.is_empty()) {
                    continue;
                }
                text.push_str(&cells.join(" | "));
                text.push('\n');
            }
        }

        text.push('\n');
    }

    Ok(text)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 => format!("{:.0}", f),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string().to_uppercase(),
        Data::Error(e) => format!("#ERROR: {:?}", e),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

fn pptx_text(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::Parse(format!("failed to open PPTX: {}", e)))?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let run_re = Regex::new(r"<a:t(?:\s[^>]*)?>([^<]*)</a:t>")
        .map_err(|e| Error::Other(format!("slide text pattern: {}", e)))?;

    let mut text = String::new();
    for (_, name) in slides {
        let mut xml = String::new();
        archive
            .by_name(&name)
            .map_err(|e| Error::Parse(format!("failed to read {}: {}", name, e)))?
            .read_to_string(&mut xml)?;

        let runs: Vec<String> = run_re
            .captures_iter(&xml)
            .filter_map(|caps| caps.get(1))
            .map(|m| unescape_xml(m.as_str()))
            .filter(|run| !run.trim().is_empty())
            .collect();
        if !runs.is_empty() {
            text.push_str(&runs.join(" "));
            text.push_str("\n\n");
        }
    }

    Ok(text)
}

/// Decode XML entities in one pass; unknown references are kept as written
fn unescape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let code = match entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => entity.strip_prefix('#')?.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
