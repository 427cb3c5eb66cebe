//! JSON file helpers shared by the dataset and state stores.
//!
//! Reads report syntax errors with line/column context; writes go through a
//! temporary file in the destination directory followed by an atomic rename,
//! so a crash mid-write never leaves a truncated document behind.

use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON syntax error in {path} at line {line}, column {column}: {msg}")]
    Syntax {
        path: PathBuf,
        msg: String,
        line: usize,
        column: usize,
    },

    #[error("Unexpected document shape in {path}: {msg}")]
    Shape { path: PathBuf, msg: String },

    #[error("JSON serialization error for {path}: {msg}")]
    Serialization { path: PathBuf, msg: String },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn from_json(path: &Path, e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_eof() {
            StoreError::Syntax {
                path: path.to_path_buf(),
                msg: e.to_string(),
                line: e.line(),
                column: e.column(),
            }
        } else {
            StoreError::Shape {
                path: path.to_path_buf(),
                msg: e.to_string(),
            }
        }
    }
}

/// Read a JSON document, returning `None` when the file does not exist.
pub fn read_json_value(path: &Path) -> Result<Option<serde_json::Value>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    if text.trim().is_empty() {
        return Err(StoreError::Shape {
            path: path.to_path_buf(),
            msg: "empty document".to_string(),
        });
    }

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| StoreError::from_json(path, e))
}

/// Pretty-print `value` to `path` through a temp file + rename.
pub fn write_json_atomic<T>(path: &Path, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

    let tmp = NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, value).map_err(|e| StoreError::Serialization {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })?;
        writer.write_all(b"\n").map_err(|e| StoreError::io(path, e))?;
        writer.flush().map_err(|e| StoreError::io(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| StoreError::io(path, e))?;
    tmp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let value = read_json_value(&dir.path().join("nope.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_round_trip_preserves_unicode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("data.json");
        write_json_atomic(&path, &json!({"name": "Antidépresseur"})).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Antidépresseur"));
        assert!(raw.ends_with('\n'));

        let value = read_json_value(&path).unwrap().unwrap();
        assert_eq!(value["name"], "Antidépresseur");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        write_json_atomic(&path, &json!([1, 2, 3])).unwrap();
        write_json_atomic(&path, &json!([4])).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_syntax_error_has_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{\n  \"a\": ,\n}").unwrap();

        match read_json_value(&path) {
            Err(StoreError::Syntax { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_file_is_shape_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.json");
        fs::write(&path, "   ").unwrap();
        assert!(matches!(read_json_value(&path), Err(StoreError::Shape { .. })));
    }
}
