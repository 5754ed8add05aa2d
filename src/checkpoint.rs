use crate::error::PipelineError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Outcome of [`load_or_compute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Memo<T> {
    /// Read back from an existing checkpoint; the computation was skipped.
    Restored(T),
    /// Freshly computed; the caller decides when to persist it.
    Computed(T),
}

impl<T> Memo<T> {
    pub fn is_restored(&self) -> bool {
        matches!(self, Memo::Restored(_))
    }
}

/// Snapshot of a partially completed extraction loop.
///
/// Field order is part of the on-disk layout: the records come last so that
/// [`peek_extraction`] can stop before them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionCheckpoint<R> {
    /// Absolute index of the first input file not yet processed.
    pub next_index: usize,
    /// Seconds spent on each successfully processed file.
    pub durations: Vec<f64>,
    /// Records extracted from every file before `next_index`.
    pub records: Vec<R>,
}

impl<R> ExtractionCheckpoint<R> {
    pub fn fresh(start: usize) -> Self {
        Self {
            next_index: start,
            durations: Vec::new(),
            records: Vec::new(),
        }
    }
}

/// Where an extraction checkpoint stands, without its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionProgress {
    pub next_index: usize,
    pub records: usize,
}

/// Prefix of an encoded [`ExtractionCheckpoint`]. The sequence length of
/// `records` decodes as a plain `usize`.
#[derive(Deserialize)]
struct ExtractionHeader {
    next_index: usize,
    _durations: Vec<f64>,
    record_count: usize,
}

/// Read the position of an extraction checkpoint without decoding its
/// records.
pub fn peek_extraction(path: &Path) -> Result<Option<ExtractionProgress>, PipelineError> {
    Ok(load::<ExtractionHeader>(path)?.map(|header| ExtractionProgress {
        next_index: header.next_index,
        records: header.record_count,
    }))
}

/// Load a checkpoint if one exists at `path`.
///
/// The content is trusted: there is no checksum or version tag, so a
/// well-formed checkpoint left over from a different run is returned as is.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PipelineError> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let value = bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
    Ok(Some(value))
}

/// Write `value` to `path` so that no reader ever sees a partial file: the
/// bytes go to a temporary file in the same directory which is synced and then
/// renamed over `path`.
pub fn persist<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        bincode::serde::encode_into_std_write(value, &mut writer, bincode::config::standard())?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}

/// Return the checkpoint at `path` if present, otherwise run `compute`.
///
/// Nothing is persisted here. Extraction flushes every K items and
/// consolidation stages flush once on completion, so the caller owns that
/// decision.
pub fn load_or_compute<T, F>(path: &Path, compute: F) -> Result<Memo<T>, PipelineError>
where
    T: DeserializeOwned,
    F: FnOnce() -> Result<T, PipelineError>,
{
    match load(path)? {
        Some(value) => Ok(Memo::Restored(value)),
        None => compute().map(Memo::Computed),
    }
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
