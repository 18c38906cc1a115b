// 📄 Contest Loader - One result table in, one canonical standings list out
// Keeps exactly three positional columns: place, name, club

use crate::error::LoadError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

// ============================================================================
// CORE TYPES
// ============================================================================

/// A finishing position as it appears in the source table.
///
/// Anything that does not parse as a number ("Ab.", "DNF", ...) is a
/// non-finisher; all non-finishers of a contest tie for last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// 1-based numeric place
    Finished(u32),

    /// Raw non-numeric marker from the source table
    NotFinished(String),
}

impl Placement {
    pub fn parse(field: &str) -> Placement {
        let trimmed = field.trim();
        match trimmed.parse::<u32>() {
            Ok(place) => Placement::Finished(place),
            Err(_) => Placement::NotFinished(trimmed.to_string()),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Placement::Finished(_))
    }
}

/// One row of a contest result table, raw name not yet resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestEntry {
    pub placement: Placement,
    pub name: String,
    pub club: String,
}

/// One contest's result table plus its provenance.
#[derive(Debug, Clone)]
pub struct Contest {
    /// Source-file identifier (the file name), key of the processed registry
    pub source_id: String,

    /// Date parsed from the file-name prefix, if any
    pub date: Option<NaiveDate>,

    /// Entries in source order
    pub entries: Vec<ContestEntry>,
}

// ============================================================================
// LOADING
// ============================================================================

/// Load one contest file into a `Contest`.
///
/// The table is read positionally: column 0 place, column 1 name, column 2
/// club; extra columns are ignored and a header row is skipped. Rows with a
/// missing field are dropped. Encoding is UTF-8 with a UTF-16 fallback.
pub fn load(path: &Path) -> Result<Contest, LoadError> {
    let source_id = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let text = decode_text(&bytes).ok_or_else(|| LoadError::Decode {
        path: path.display().to_string(),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut entries = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|source| LoadError::Csv {
            path: path.display().to_string(),
            source,
        })?;

        let place = record.get(0).unwrap_or("").trim();
        let name = record.get(1).unwrap_or("").trim();
        let club = record.get(2).unwrap_or("").trim();

        if idx == 0 && is_header(place, name) {
            continue;
        }
        if place.is_empty() || name.is_empty() || club.is_empty() {
            debug!(source = %source_id, row = idx, "dropping row with missing field");
            continue;
        }

        entries.push(ContestEntry {
            placement: Placement::parse(place),
            name: name.to_string(),
            club: club.to_string(),
        });
    }

    Ok(Contest {
        date: date_from_source_id(&source_id),
        source_id,
        entries,
    })
}

/// Parse the `YYYY-MM-DD` prefix of a source-file identifier.
pub fn date_from_source_id(source_id: &str) -> Option<NaiveDate> {
    let prefix = source_id.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// A first row is a header only when both the place and name columns are the
/// literal column words. (A non-numeric place alone is a legitimate
/// non-finisher row, and a participant really can be named "Name".)
fn is_header(place: &str, name: &str) -> bool {
    place.eq_ignore_ascii_case("place") && name.eq_ignore_ascii_case("name")
}

/// Decode source bytes: UTF-8 first, then UTF-16 (BOM-aware, defaulting to
/// little-endian like the upstream export tool).
fn decode_text(bytes: &[u8]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(text.to_string());
    }

    let (body, big_endian) = match bytes {
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        _ => (bytes, false),
    };
    if body.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).ok()
}

// ============================================================================
// TESTS
// ============================================================================
