//! Turns uploaded bytes into a header plus trimmed rows.
//!
//! Centers export from Excel, hospital systems and hand-edited files, so the
//! input may carry a BOM, be UTF-16, or be in a legacy single-byte code page.
//! All of that is normalised to UTF-8 before the CSV reader sees it.

use crate::error::{Error, Result};
use common::model::report::FieldError;

/// Parsed upload: header cells and data rows, every cell trimmed.
///
/// Rows are padded or cut to the header width so column indexes are always
/// valid; `ragged_rows` counts how many rows did not match it.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub file_size: u64,
    pub ragged_rows: usize,
}

impl Dataset {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.header.len()
    }
}

/// Windows-1252 code points for bytes 0x80..=0x9F; the rest of the range
/// matches Latin-1.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

fn decode_cp1252(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize],
            _ => b as char,
        })
        .collect()
}

fn decode_utf16(bytes: &[u8], little_endian: bool) -> String {
    let units = bytes.chunks_exact(2).map(|pair| {
        if little_endian {
            u16::from_le_bytes([pair[0], pair[1]])
        } else {
            u16::from_be_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Decodes raw upload bytes to text, stripping any byte-order mark.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return match std::str::from_utf8(rest) {
            Ok(s) => s.to_string(),
            Err(_) => decode_cp1252(rest),
        };
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, true);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, false);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => decode_cp1252(bytes),
    }
}

/// Picks the most frequent candidate delimiter in the header line; comma wins ties.
pub fn detect_delimiter(header_line: &str) -> u8 {
    let mut best = (b',', header_line.matches(',').count());
    for d in [';', '\t', '|'] {
        let count = header_line.matches(d).count();
        if count > best.1 {
            best = (d as u8, count);
        }
    }
    best.0
}

/// Trims a cell and folds non-breaking spaces, which spreadsheets love to emit.
pub fn normalize_cell(cell: &str) -> String {
    cell.replace('\u{00A0}', " ").trim().to_string()
}

fn csv_error(err: csv::Error) -> Error {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    Error::invalid_fields(
        "file could not be read as CSV; check its encoding and delimiter",
        vec![FieldError::new("file", format!("line {}: {}", line, err))],
    )
}

pub fn parse_csv(bytes: &[u8]) -> Result<Dataset> {
    let text = decode_text(bytes);
    let delimiter = detect_delimiter(text.lines().next().unwrap_or(""));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let header: Vec<String> = match records.next() {
        Some(record) => record.map_err(csv_error)?.iter().map(normalize_cell).collect(),
        None => {
            return Err(Error::invalid_fields(
                "file is empty",
                vec![FieldError::new("file", "no header row found")],
            ))
        }
    };

    let width = header.len();
    let mut rows = Vec::new();
    let mut ragged_rows = 0;
    for record in records {
        let record = record.map_err(csv_error)?;
        if record.len() != width {
            ragged_rows += 1;
        }
        let mut cells: Vec<String> = record.iter().take(width).map(normalize_cell).collect();
        cells.resize(width, String::new());
        rows.push(cells);
    }
    while rows
        .last()
        .is_some_and(|r| r.iter().all(|c| c.is_empty()))
    {
        rows.pop();
    }

    Ok(Dataset {
        header,
        rows,
        file_size: bytes.len() as u64,
        ragged_rows,
    })
}
