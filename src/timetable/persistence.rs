//! Load/save the persisted `timetable.json` document. Writes are
//! write-to-temp-then-rename so a crash mid-write never corrupts the file
//! the daemon reads back on restart.

use super::document::TimeTableDocument;
use super::TimeTableError;
use std::fs;
use std::path::Path;

pub fn load(path: &Path) -> Result<TimeTableDocument, TimeTableError> {
    let contents = fs::read_to_string(path).map_err(|e| TimeTableError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&contents)
}

pub fn parse(contents: &str) -> Result<TimeTableDocument, TimeTableError> {
    serde_json::from_str(contents).map_err(|e| TimeTableError::InvalidSyntax(e.to_string()))
}

pub fn save(doc: &TimeTableDocument, path: &Path) -> Result<(), TimeTableError> {
    let json = serde_json::to_string_pretty(doc)
        .map_err(|e| TimeTableError::InvalidSyntax(e.to_string()))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| TimeTableError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    use std::io::Write;
    tmp.write_all(json.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| TimeTableError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

    tmp.persist(path).map_err(|e| TimeTableError::Io {
        path: path.display().to_string(),
        source: e.error,
    })?;

    Ok(())
}
