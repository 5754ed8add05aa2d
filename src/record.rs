use crate::checkpoint::parent_dir;
use crate::error::PipelineError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// A unit of domain output. The coordination layer only counts, moves and
/// serializes records; it never looks inside them.
///
/// Records are checkpointed with bincode, so their serde representation must
/// not rely on self-describing formats (no `#[serde(untagged)]`, no
/// `serde_json::Value`).
pub trait Record: Serialize + DeserializeOwned + Clone + Send + 'static {}

impl<T> Record for T where T: Serialize + DeserializeOwned + Clone + Send + 'static {}

/// Write a record set as a JSON array, replacing `path` atomically.
pub fn write_records<R: Record>(path: &Path, records: &[R]) -> Result<(), PipelineError> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}

pub fn read_records<R: Record>(path: &Path) -> Result<Vec<R>, PipelineError> {
    let file = File::open(path)?;
    let records = serde_json::from_reader(BufReader::new(file))?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
        weight: u32,
    }

    #[test]
    fn test_write_then_read_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("worker-1").join("local_consolidation.json");

        let notes = vec![
            Note { text: "a".into(), weight: 1 },
            Note { text: "b".into(), weight: 2 },
        ];
        write_records(&path, &notes).unwrap();

        let loaded: Vec<Note> = read_records(&path).unwrap();
        assert_eq!(loaded, notes);
    }

    #[test]
    fn test_empty_record_set_is_still_written() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("empty.json");

        write_records::<Note>(&path, &[]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
        let loaded: Vec<Note> = read_records(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result: Result<Vec<Note>, _> = read_records(&temp_dir.path().join("nope.json"));
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }
}
