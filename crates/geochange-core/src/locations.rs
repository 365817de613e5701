use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use fs2::FileExt;
use geochange_util::{state_file_path, write_json_atomic};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const LOCATIONS_FILE: &str = "saved_locations.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationBookmark {
    pub name: String,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
}

/// Named coordinates kept as one JSON array, rewritten whole on every change. Mutations are
/// serialized within the process by a mutex and across processes by an exclusive lock on a
/// sibling `.lock` file.
pub struct LocationStore {
    path: PathBuf,
    guard: Mutex<()>,
}

struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl LocationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn open_default() -> Self {
        Self::new(state_file_path(LOCATIONS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> io::Result<FileLock> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.path.with_extension("lock"))?;
        file.lock_exclusive()?;
        Ok(FileLock { file })
    }

    pub fn load(&self) -> Vec<LocationBookmark> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_unlocked()
    }

    pub fn find(&self, name: &str) -> Option<LocationBookmark> {
        let name = name.trim();
        self.load().into_iter().find(|item| item.name == name)
    }

    pub fn save(
        &self,
        name: &str,
        latitude: f64,
        longitude: f64,
    ) -> io::Result<Option<Vec<LocationBookmark>>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        self.update(|items| {
            items.retain(|item| item.name != name);
            items.push(LocationBookmark {
                name: name.to_string(),
                latitude,
                longitude,
            });
        })
        .map(Some)
    }

    pub fn delete(&self, name: &str) -> io::Result<Vec<LocationBookmark>> {
        let name = name.trim();
        self.update(|items| items.retain(|item| item.name != name))
    }

    fn update<F>(&self, change: F) -> io::Result<Vec<LocationBookmark>>
    where
        F: FnOnce(&mut Vec<LocationBookmark>),
    {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let _lock = self.lock_file()?;
        let mut items = self.read_unlocked();
        change(&mut items);
        write_json_atomic(&self.path, &items)?;
        Ok(items)
    }

    fn read_unlocked(&self) -> Vec<LocationBookmark> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", self.path.display());
                }
                return Vec::new();
            }
        };
        match serde_json::from_str(&data) {
            Ok(items) => items,
            Err(err) => {
                warn!("Ignoring malformed {}: {err}", self.path.display());
                Vec::new()
            }
        }
    }
}

pub fn to_json(items: &[LocationBookmark]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> (tempfile::TempDir, LocationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocationStore::new(dir.path().join(LOCATIONS_FILE));
        (dir, store)
    }

    fn names(items: &[LocationBookmark]) -> Vec<&str> {
        items.iter().map(|item| item.name.as_str()).collect()
    }

    #[test]
    fn last_save_wins_and_moves_to_end() {
        let (_dir, store) = store();
        store.save("Kyiv", 50.45, 30.52).unwrap();
        store.save("Lviv", 49.84, 24.03).unwrap();
        let items = store.save(" Kyiv ", 50.4501, 30.5234).unwrap().unwrap();

        assert_eq!(names(&items), vec!["Lviv", "Kyiv"]);
        assert_eq!(store.load(), items);
        assert_eq!(store.find("Kyiv").unwrap().longitude, 30.5234);
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, store) = store();
        store.save("Home", 1.0, 2.0).unwrap();
        assert!(store.delete("Home").unwrap().is_empty());
        assert!(store.delete("Home").unwrap().is_empty());
        assert!(store.delete("Nowhere").unwrap().is_empty());
        assert!(store.load().is_empty());
    }

    #[test]
    fn blank_names_are_ignored() {
        let (_dir, store) = store();
        assert_eq!(store.save("   ", 1.0, 2.0).unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn malformed_file_reads_as_empty_and_is_recoverable() {
        let (_dir, store) = store();
        fs::write(store.path(), "{\"name\": oops").unwrap();
        assert!(store.load().is_empty());
        let items = store.save("Fresh", 3.0, 4.0).unwrap().unwrap();
        assert_eq!(names(&items), vec!["Fresh"]);
    }

    #[test]
    fn file_format_uses_short_coordinate_keys() {
        let (_dir, store) = store();
        store.save("Café", -33.8688, 151.2093).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw[0]["name"], "Café");
        assert_eq!(raw[0]["lat"], -33.8688);
        assert_eq!(raw[0]["lon"], 151.2093);

        let back: Vec<LocationBookmark> = serde_json::from_str(&to_json(&store.load())).unwrap();
        assert_eq!(back, store.load());
    }

    #[test]
    fn mixed_sequence_keeps_one_entry_per_live_name() {
        let (_dir, store) = store();
        let ops: &[(&str, Option<(f64, f64)>)] = &[
            ("a", Some((1.0, 1.0))),
            ("b", Some((2.0, 2.0))),
            ("a", Some((3.0, 3.0))),
            ("c", Some((4.0, 4.0))),
            ("b", None),
            ("c", Some((5.0, 5.0))),
            ("d", None),
            ("a", Some((6.0, 6.0))),
        ];
        for (name, op) in ops {
            match op {
                Some((lat, lon)) => {
                    store.save(name, *lat, *lon).unwrap();
                }
                None => {
                    store.delete(name).unwrap();
                }
            }
        }
        let items = store.load();
        assert_eq!(names(&items), vec!["c", "a"]);
        assert_eq!(items[0].latitude, 5.0);
        assert_eq!(items[1].latitude, 6.0);
    }

    #[test]
    fn concurrent_saves_lose_nothing() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..10 {
                        store
                            .save(&format!("p{i}-{j}"), i as f64, j as f64)
                            .unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(store.load().len(), 80);
    }
}
