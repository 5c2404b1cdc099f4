use crate::error::{Result, StoreError};
use crate::model::Registry;
use crate::session::Session;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The main entry point: a content root plus the model classes stored in it.
/// Every read or write happens through a [`Session`].
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    registry: Rc<Registry>,
}

impl Store {
    /// Open the store at an existing content root.
    pub fn open(path: impl AsRef<Path>, registry: Registry) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(StoreError::Other(format!(
                "Data directory does not exist: {}",
                root.display()
            )));
        }
        log::debug!(
            "Opened store at {} with models {}",
            root.display(),
            registry.names().collect::<Vec<_>>().join(", ")
        );
        Ok(Store {
            root,
            registry: Rc::new(registry),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A new read-only session over the current state of the root.
    pub fn session(&self) -> Result<Session> {
        Session::open(&self.root, Rc::clone(&self.registry))
    }

    /// Run `f` in a fresh session's read-only scope.
    pub fn read_only<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Session) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let session = self.session()?;
        session.read_only(f)
    }

    /// Run `f` in a fresh session's read-write scope, committing on success.
    pub fn read_write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Session) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let session = self.session()?;
        session.read_write(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Mode;
    use crate::testing;
    use tempfile::TempDir;

    #[test]
    fn test_open_requires_existing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = Store::open(&missing, testing::models().registry()).unwrap_err();
        assert!(err.to_string().starts_with("Data directory does not exist"));
    }

    #[test]
    fn test_sessions_see_committed_state() {
        let dir = TempDir::new().unwrap();
        let (models, store) = testing::store(dir.path());
        let before = store.session().unwrap();
        assert_eq!(before.mode(), Mode::ReadOnly);

        let author = testing::author(&models, "alice");
        store
            .read_write(|s| -> Result<()> { s.add([&author]) })
            .unwrap();

        // The older snapshot does not list the new file; a new session does.
        assert_eq!(before.query(&models.author).count().unwrap(), 0);
        let count = store
            .read_only(|s| s.query(&models.author).count())
            .unwrap();
        assert_eq!(count, 1);
    }
}
