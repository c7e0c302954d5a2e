//! File-backed persistence: one pretty-printed JSON file per factory.
//!
//! Factory names become file names after sanitizing: every character outside
//! `[A-Za-z0-9._-]` is replaced by `_`, so `"Simple Test Puck Factory"` is
//! stored as `Simple_Test_Puck_Factory.json`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use robosim_core::error::PersistenceError;
use robosim_core::persistence::{FactoryPersistence, FactorySnapshot};
use tracing::{debug, info};

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Use `dir` as the store, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the snapshot stored under `id`.
    pub fn path_for(&self, id: &str) -> Result<PathBuf, PersistenceError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(PersistenceError::MissingId);
        }
        let file: String = id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Ok(self.dir.join(format!("{file}.{EXTENSION}")))
    }

    /// Stored ids (sanitized file stems), sorted.
    pub fn ids(&self) -> Result<Vec<String>, PersistenceError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl FactoryPersistence for JsonFileStore {
    fn read(&self, id: &str) -> Result<FactorySnapshot, PersistenceError> {
        let path = self.path_for(id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound(id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let snapshot =
            serde_json::from_str(&content).map_err(|e| PersistenceError::Decode(e.to_string()))?;
        debug!(path = %path.display(), "snapshot read");
        Ok(snapshot)
    }

    fn persist(&self, snapshot: &FactorySnapshot) -> Result<(), PersistenceError> {
        let path = self.path_for(&snapshot.name)?;
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| PersistenceError::Encode(e.to_string()))?;
        // Write beside the target and rename so readers never see half a file.
        let partial = path.with_extension("json.partial");
        fs::write(&partial, json)?;
        fs::rename(&partial, &path)?;
        info!(path = %path.display(), components = snapshot.len(), "snapshot persisted");
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, PersistenceError> {
        match fs::remove_file(self.path_for(id)?) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robosim_core::geometry::Rectangle;
    use robosim_core::path::PathStrategy;
    use robosim_core::test_utils::*;

    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "robosim_store_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    // -----------------------------------------------------------------------
    // Ids
    // -----------------------------------------------------------------------

    #[test]
    fn ids_are_sanitized_into_file_names() {
        let dir = make_test_dir("sanitize");
        let store = JsonFileStore::open(&dir).unwrap();
        assert_eq!(
            store.path_for("Simple Test Puck Factory").unwrap(),
            dir.join("Simple_Test_Puck_Factory.json")
        );
        assert_eq!(store.path_for("../etc/passwd").unwrap(), dir.join(".._etc_passwd.json"));
        assert!(matches!(store.path_for("  "), Err(PersistenceError::MissingId)));
        let _ = fs::remove_dir_all(&dir);
    }

    // -----------------------------------------------------------------------
    // Round trip
    // -----------------------------------------------------------------------

    #[test]
    fn snapshot_survives_the_file_system() {
        let dir = make_test_dir("round_trip");
        let store = JsonFileStore::open(&dir).unwrap();
        let factory = open_floor();
        let machine = add_machine(&factory, "Machine", Rectangle::new(50, 50, 15, 15));
        let robot = add_robot(&factory, "Robot", 5, 5, PathStrategy::Library);
        factory.add_robot_target(robot, machine).unwrap();

        store.persist(&factory.snapshot()).unwrap();
        assert_eq!(store.ids().unwrap(), vec!["Test_Floor".to_string()]);

        let read = store.read("Test Floor").unwrap();
        assert_eq!(read.name, "Test Floor");
        assert_eq!(read.order, factory.snapshot().order);
        let (id, stored) = read.component_by_name("Robot").unwrap();
        assert_eq!(id, robot);
        assert_eq!(stored, &factory.component(robot).unwrap());

        assert!(store.delete("Test Floor").unwrap());
        assert!(!store.delete("Test Floor").unwrap());
        assert!(matches!(store.read("Test Floor"), Err(PersistenceError::NotFound(_))));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn garbage_file_fails_to_decode() {
        let dir = make_test_dir("garbage");
        let store = JsonFileStore::open(&dir).unwrap();
        fs::write(dir.join("Broken.json"), "[1, 2").unwrap();
        assert!(matches!(store.read("Broken"), Err(PersistenceError::Decode(_))));
        let _ = fs::remove_dir_all(&dir);
    }
}
