use log::{debug, info};
use snafu::prelude::*;

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::dash::*;

pub const NOTES_HEADER: [&str; 3] = ["Surveyor_Name", "Timestamp", "Notes"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One row of the notes log.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct NoteRecord {
    #[serde(rename = "Surveyor_Name")]
    pub surveyor: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Notes")]
    pub notes: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum NoteOutcome {
    Appended,
    /// The note was blank. Nothing was written.
    Discarded,
}

fn encode(record: &NoteRecord, with_header: bool) -> DashResult<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if with_header {
        wtr.write_record(NOTES_HEADER).context(WritingCsvSnafu {})?;
    }
    wtr.serialize(record).context(WritingCsvSnafu {})?;
    let buf = wtr
        .into_inner()
        .map_err(|e| e.into_error())
        .context(WritingNotesSnafu { path: "notes" })?;
    Ok(buf)
}

/// Creates the log with its header and a first note.
///
/// The content is prepared in a temporary file next to the log and linked into place only if
/// no log exists yet. Returns false when another writer created the log first.
fn create_log(path: &Path, record: &NoteRecord) -> BDashResult<bool> {
    let path_s = path.display().to_string();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = NamedTempFile::new_in(&dir).context(OpeningNotesSnafu {
        path: dir.display().to_string(),
    })?;
    tmp.write_all(&encode(record, true)?)
        .context(WritingNotesSnafu {
            path: path_s.clone(),
        })?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            debug!("create_log: {} was created meanwhile", path_s);
            Ok(false)
        }
        Err(e) => Err(Box::new(DashError::WritingNotes {
            source: e.error,
            path: path_s,
        })),
    }
}

/// Appends a note to the log, creating the log with its header if needed.
///
/// The header only appears once, at the top, even when several writers race to create the
/// log. Each note goes out in a single write so that concurrent writers do not interleave
/// partial rows.
pub fn append_note(
    path: &Path,
    surveyor: &str,
    text: &str,
    at: NaiveDateTime,
) -> BDashResult<NoteOutcome> {
    if text.trim().is_empty() {
        debug!("append_note: empty note for {:?} discarded", surveyor);
        return Ok(NoteOutcome::Discarded);
    }
    let path_s = path.display().to_string();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context(OpeningNotesSnafu {
                path: path_s.clone(),
            })?;
        }
    }
    let record = NoteRecord {
        surveyor: surveyor.to_string(),
        timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
        notes: text.to_string(),
    };

    let created = !path.exists() && create_log(path, &record)?;
    if !created {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .context(OpeningNotesSnafu {
                path: path_s.clone(),
            })?;
        file.write_all(&encode(&record, false)?)
            .context(WritingNotesSnafu { path: path_s })?;
    }
    info!("append_note: note for {} saved in {}", surveyor, path.display());
    Ok(NoteOutcome::Appended)
}

pub fn append_note_now(path: &Path, surveyor: &str, text: &str) -> BDashResult<NoteOutcome> {
    append_note(path, surveyor, text, Local::now().naive_local())
}

/// The notes of the log, optionally restricted to one surveyor. A missing log has no notes.
pub fn read_notes(path: &Path, surveyor: Option<&str>) -> BDashResult<Vec<NoteRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let path_s = path.display().to_string();
    let mut rdr = csv::Reader::from_path(path).context(ReadingNotesSnafu {
        path: path_s.clone(),
    })?;
    let mut res: Vec<NoteRecord> = Vec::new();
    for record in rdr.deserialize() {
        let note: NoteRecord = record.context(ReadingNotesSnafu {
            path: path_s.clone(),
        })?;
        if surveyor.map(|s| s == note.surveyor).unwrap_or(true) {
            res.push(note);
        }
    }
    Ok(res)
}
