use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::types::Record;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn load_from_storage<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DataError> {
    let file = File::open(path)?;
    let mut buffer: Vec<u8> = Vec::new();
    let size = BufReader::new(file).read_to_end(&mut buffer)?;
    debug!(path = %path.display(), size, "read collection file");
    Ok(serde_json::from_slice::<Vec<T>>(&buffer)?)
}

pub fn write_local_db<T: Serialize>(path: &Path, records: &[T]) -> Result<(), DataError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}

/// An in-memory collection mirrored to a JSON file.
///
/// Every mutation rewrites the whole file. Write failures are logged and the
/// in-memory change is kept.
#[derive(Debug)]
pub struct Store<R> {
    path: PathBuf,
    records: Vec<R>,
}

impl<R: Record> Store<R> {
    /// Loads the collection, falling back to an empty one if the file is
    /// missing or cannot be parsed.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match load_from_storage(&path) {
            Ok(records) => records,
            Err(DataError::Io(error)) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no collection file, starting empty");
                Vec::new()
            }
            Err(error) => {
                error!(path = %path.display(), %error, "failed to read collection file");
                Vec::new()
            }
        };
        info!(collection = R::LABEL, count = records.len(), "loaded records");
        Store { path, records }
    }

    pub fn list(&self) -> &[R] {
        &self.records
    }

    /// Ids are derived from the current length and can repeat after deletions.
    pub fn next_id(&self) -> u64 {
        self.records.len() as u64 + 1
    }

    pub fn append(&mut self, record: R) {
        self.records.push(record);
        self.persist();
    }

    pub fn find(&self, id: u64) -> Option<&R> {
        self.records.iter().find(|record| record.id() == id)
    }

    /// Removes the first record with `id` and rewrites the file.
    pub fn remove_by_id(&mut self, id: u64) -> Option<R> {
        let index = self.records.iter().position(|record| record.id() == id)?;
        let removed = self.records.remove(index);
        self.persist();
        Some(removed)
    }

    pub fn persist(&self) {
        if let Err(error) = write_local_db(&self.path, &self.records) {
            error!(path = %self.path.display(), %error, "failed to write collection file");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, fs};

    use super::*;
    use crate::types::{Project, Property};

    fn property(store: &Store<Property>, name: &str) -> Property {
        let mut fields = HashMap::from([("name".to_string(), name.to_string())]);
        Property::from_form(store.next_id(), &mut fields, String::new())
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store: Store<Property> = Store::load(dir.path().join("properties.json"));
        assert!(store.list().is_empty());
        assert_eq!(store.next_id(), 1);
    }

    #[test]
    fn garbage_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.json");
        fs::write(&path, "{ not json").unwrap();

        let store: Store<Project> = Store::load(&path);
        assert!(store.list().is_empty());
    }

    #[test]
    fn append_persists_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("properties.json");

        let mut store: Store<Property> = Store::load(&path);
        for name in ["Villa", "Cabin", "Loft"] {
            let record = property(&store, name);
            store.append(record);
        }

        let reloaded: Store<Property> = Store::load(&path);
        assert_eq!(reloaded.list(), store.list());
        let ids: Vec<u64> = reloaded.list().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn file_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("properties.json");

        let mut store: Store<Property> = Store::load(&path);
        let record = property(&store, "Villa");
        store.append(record);

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("[\n  {\n    \"id\": 1,"));
    }

    #[test]
    fn remove_by_id_removes_first_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("properties.json");

        let mut store: Store<Property> = Store::load(&path);
        for name in ["Villa", "Cabin"] {
            let record = property(&store, name);
            store.append(record);
        }

        let removed = store.remove_by_id(1).unwrap();
        assert_eq!(removed.name.as_deref(), Some("Villa"));
        assert!(store.remove_by_id(1).is_none());

        let reloaded: Store<Property> = Store::load(&path);
        assert_eq!(reloaded.list().len(), 1);
        assert_eq!(reloaded.list()[0].id, 2);
    }

    #[test]
    fn ids_repeat_after_deleting_a_middle_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store: Store<Property> = Store::load(dir.path().join("properties.json"));
        for name in ["a", "b", "c"] {
            let record = property(&store, name);
            store.append(record);
        }
        store.remove_by_id(2);
        assert_eq!(store.next_id(), 3);
    }

    #[test]
    fn find_returns_first_match_without_removing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store: Store<Property> = Store::load(dir.path().join("properties.json"));
        for name in ["a", "b", "c"] {
            let record = property(&store, name);
            store.append(record);
        }
        store.remove_by_id(1);
        let record = property(&store, "d");
        store.append(record);

        assert_eq!(store.find(3).and_then(|p| p.name.as_deref()), Some("c"));
        assert!(store.find(1).is_none());
        assert_eq!(store.list().len(), 3);
    }

    #[test]
    fn failed_write_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("properties.json");

        let mut store: Store<Property> = Store::load(&path);
        let record = property(&store, "Villa");
        store.append(record);

        assert_eq!(store.list().len(), 1);
        assert!(!path.exists());
    }
}
