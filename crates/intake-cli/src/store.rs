use std::fs;
use std::io;
use std::path::PathBuf;

use intake_spec::{SnapshotStore, StoreError};

/// Drafts on disk: one `<key>.json` file per storage key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl SnapshotStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Read {
                key: key.to_string(),
                message: err.to_string(),
            }),
        }
    }

    fn save(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        let write_error = |err: io::Error| StoreError::Write {
            key: key.to_string(),
            message: err.to_string(),
        };
        fs::create_dir_all(&self.dir).map_err(write_error)?;
        fs::write(self.path_for(key), contents).map_err(write_error)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Remove {
                key: key.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_and_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("drafts"));
        assert_eq!(store.load("physio-questionnaire-v1").expect("load"), None);

        store
            .save("physio-questionnaire-v1", r#"{"name":"山田"}"#)
            .expect("save");
        assert_eq!(
            store.load("physio-questionnaire-v1").expect("load").as_deref(),
            Some(r#"{"name":"山田"}"#)
        );

        store.remove("physio-questionnaire-v1").expect("remove");
        store.remove("physio-questionnaire-v1").expect("second remove");
        assert_eq!(store.load("physio-questionnaire-v1").expect("load"), None);
    }

    #[test]
    fn keys_cannot_escape_the_directory() {
        let store = FileStore::new("/var/drafts");
        assert_eq!(
            store.path_for("../etc/passwd"),
            PathBuf::from("/var/drafts/.._etc_passwd.json")
        );
    }
}
