// Sessions: the transaction boundary around reads and writes of one
// content root.

mod actions;
mod lock;

pub use actions::CommitAction;
pub use lock::LOCK_FILE;

use crate::document::Document;
use crate::error::{Result, StoreError};
use crate::model::{ModelClass, Registry};
use crate::query::Query;
use lock::RootLock;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::{NamedTempFile, TempDir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

/// Unit of work over a content root: the snapshot of known filenames, one
/// live instance per loaded identifier and the file actions queued for
/// commit.
pub struct Session {
    root: PathBuf,
    registry: Rc<Registry>,
    mode: Cell<Mode>,
    state: RefCell<SessionState>,
}

#[derive(Default)]
struct SessionState {
    /// Files listed when the session began.
    snapshot: BTreeSet<String>,
    /// Snapshot minus the files deleted since.
    known: BTreeSet<String>,
    instances: BTreeMap<String, Document>,
    actions: Vec<CommitAction>,
    /// Hidden directory inside the root holding serialized documents
    /// until they are promoted.
    staging: Option<TempDir>,
}

impl Session {
    pub fn open(root: impl Into<PathBuf>, registry: Rc<Registry>) -> Result<Session> {
        let session = Session {
            root: root.into(),
            registry,
            mode: Cell::new(Mode::ReadOnly),
            state: RefCell::new(SessionState::default()),
        };
        session.begin()?;
        Ok(session)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    /// Take a fresh filename snapshot and drop every cached instance and
    /// queued action.
    pub fn begin(&self) -> Result<()> {
        self.discard_staging();
        let files = list_files(&self.root)?;
        let mut state = self.state.borrow_mut();
        state.known = files.clone();
        state.snapshot = files;
        state.instances.clear();
        state.actions.clear();
        Ok(())
    }

    /// Known filenames, sorted.
    pub fn known_files(&self) -> Vec<String> {
        self.state.borrow().known.iter().cloned().collect()
    }

    pub fn query(&self, class: &Rc<ModelClass>) -> Query<'_> {
        Query::new(self, class)
    }

    /// Register documents to be written at commit. They are visible to
    /// queries of this session right away.
    pub fn add<'d>(&self, docs: impl IntoIterator<Item = &'d Document>) -> Result<()> {
        for doc in docs {
            let uuid = doc.uuid()?;
            log::debug!("Adding {}", doc.label());
            self.state.borrow_mut().instances.insert(uuid, doc.clone());
        }
        Ok(())
    }

    /// Schedule documents for deletion, along with every file stored under
    /// their directory. Later queries of this session no longer see them.
    pub fn delete<'d>(&self, docs: impl IntoIterator<Item = &'d Document>) -> Result<()> {
        if self.mode() != Mode::ReadWrite {
            return Err(StoreError::SessionReadOnly);
        }
        for doc in docs {
            let uuid = doc.uuid()?;
            let filename = doc.filename()?;
            let prefix = match filename.rsplit_once('/') {
                Some((dir, _)) => format!("{dir}/"),
                None => filename.clone(),
            };
            log::debug!("Deleting {}", doc.label());

            let mut state = self.state.borrow_mut();
            state.instances.remove(&uuid);
            state.instances.retain(|_, cached| {
                cached
                    .filename()
                    .map_or(true, |f| !f.starts_with(&prefix))
            });

            let owned: Vec<String> = state
                .known
                .iter()
                .filter(|f| **f == filename || f.starts_with(&prefix))
                .cloned()
                .collect();
            for target in owned {
                state.known.remove(&target);
                state.actions.push(CommitAction::DeleteFile { target });
            }
        }
        Ok(())
    }

    /// Whether `doc` is cached here or stored in the snapshot.
    pub fn is_in(&self, doc: &Document) -> bool {
        let Ok(uuid) = doc.uuid() else {
            return false;
        };
        let state = self.state.borrow();
        if state.instances.contains_key(&uuid) {
            return true;
        }
        doc.filename()
            .map_or(false, |filename| state.known.contains(&filename))
    }

    /// Serialize and validate every cached document, then run the queued
    /// file actions in order. Nothing in the tree changes if serialization
    /// fails.
    pub fn commit(&self) -> Result<()> {
        if self.mode() != Mode::ReadWrite {
            return Err(StoreError::SessionReadOnly);
        }

        let instances: Vec<Document> = self.state.borrow().instances.values().cloned().collect();
        for doc in &instances {
            doc.persist(self)?;
        }

        let actions = std::mem::take(&mut self.state.borrow_mut().actions);
        log::debug!(
            "Committing {} documents, {} file actions",
            instances.len(),
            actions.len()
        );
        for action in &actions {
            log::debug!("Commit action: {action}");
            action.run(&self.root)?;
        }

        self.begin()
    }

    /// Forget cached instances, queued actions and deletions.
    pub fn rollback(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.known = state.snapshot.clone();
            state.instances.clear();
            state.actions.clear();
        }
        self.discard_staging();
    }

    /// Run `f` in a read-write scope: take the root lock, commit when `f`
    /// succeeds and roll back otherwise. On a session already in a
    /// read-write scope, `f` simply joins it.
    pub fn read_write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Session) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        if self.mode() == Mode::ReadWrite {
            return f(self);
        }

        let _lock = RootLock::acquire(&self.root)?;
        let _scope = ScopeGuard::enter(self, Mode::ReadWrite);
        let outcome = f(self).and_then(|value| {
            self.commit()?;
            Ok(value)
        });
        if outcome.is_err() {
            self.rollback();
        }
        outcome
    }

    /// Run `f` in a read-only scope, which always ends in a rollback.
    /// Inside a read-write scope, `f` joins that scope instead.
    pub fn read_only<T>(&self, f: impl FnOnce(&Session) -> T) -> T {
        if self.mode() == Mode::ReadWrite {
            return f(self);
        }
        let _scope = ScopeGuard::enter(self, Mode::ReadOnly);
        f(self)
    }

    // ── Crate internals ──────────────────────────────────────────────

    pub(crate) fn cached(&self, uuid: &str) -> Option<Document> {
        self.state.borrow().instances.get(uuid).cloned()
    }

    pub(crate) fn cached_of_class(&self, class: &str) -> Vec<Document> {
        self.state
            .borrow()
            .instances
            .values()
            .filter(|doc| doc.class().name() == class)
            .cloned()
            .collect()
    }

    /// Cache a document loaded from the tree.
    pub(crate) fn remember(&self, doc: &Document) {
        if let Ok(uuid) = doc.uuid() {
            self.state
                .borrow_mut()
                .instances
                .entry(uuid)
                .or_insert_with(|| doc.clone());
        }
    }

    pub(crate) fn cached_ids(&self) -> BTreeSet<String> {
        self.state.borrow().instances.keys().cloned().collect()
    }

    /// Evict every instance cached after `before` was taken.
    pub(crate) fn forget_since(&self, before: &BTreeSet<String>) {
        self.state
            .borrow_mut()
            .instances
            .retain(|uuid, _| before.contains(uuid));
    }

    pub(crate) fn queue(&self, action: CommitAction) {
        log::debug!("Queued commit action: {action}");
        self.state.borrow_mut().actions.push(action);
    }

    /// Write serialized content to staging and queue its promotion to `target`.
    pub(crate) fn stage(&self, target: &str, content: &str) -> Result<()> {
        let dir = self.staging_dir()?;
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(content.as_bytes())?;
        let (_, staged) = file.keep().map_err(|e| e.error)?;
        self.queue(CommitAction::Promote {
            staged,
            target: target.to_string(),
        });
        Ok(())
    }

    fn staging_dir(&self) -> Result<PathBuf> {
        let mut state = self.state.borrow_mut();
        if let Some(dir) = &state.staging {
            return Ok(dir.path().to_path_buf());
        }
        let dir = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)?;
        let path = dir.path().to_path_buf();
        state.staging = Some(dir);
        Ok(path)
    }

    fn discard_staging(&self) {
        let staging = self.state.borrow_mut().staging.take();
        if let Some(dir) = staging {
            let path = dir.path().display().to_string();
            if let Err(e) = dir.close() {
                log::warn!("Failed to remove staging directory {}: {}", path, e);
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.root)
            .field("mode", &self.mode())
            .finish()
    }
}

/// Ends a scope on every exit path, unwinding included: read-only scopes
/// roll back, read-write scopes return the session to read-only.
struct ScopeGuard<'a> {
    session: &'a Session,
    mode: Mode,
}

impl<'a> ScopeGuard<'a> {
    fn enter(session: &'a Session, mode: Mode) -> Self {
        session.mode.set(mode);
        ScopeGuard { session, mode }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        match self.mode {
            Mode::ReadOnly => self.session.rollback(),
            Mode::ReadWrite => {
                if std::thread::panicking() {
                    self.session.rollback();
                }
                self.session.mode.set(Mode::ReadOnly);
            }
        }
    }
}

/// Every regular file under `root`, relative and `/`-separated, skipping
/// hidden entries (lock file, staging) at any depth.
fn list_files(root: &Path) -> Result<BTreeSet<String>> {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&root.to_string_lossy()));
    let entries =
        glob::glob(&pattern).map_err(|e| StoreError::Other(format!("Glob error: {e}")))?;

    let mut files = BTreeSet::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Skipping unreadable path: {}", e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.iter().any(|p| p.starts_with('.')) {
            continue;
        }
        files.insert(parts.join("/"));
    }
    Ok(files)
}
