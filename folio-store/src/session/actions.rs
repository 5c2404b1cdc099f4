use crate::error::Result;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempPath;

/// Filesystem mutation deferred until commit. Targets are relative to the
/// store root.
#[derive(Debug)]
pub enum CommitAction {
    /// Rename a serialized document from the staging directory into place.
    Promote { staged: PathBuf, target: String },
    /// Copy staged content of an attached file into place.
    CopyFile { source: Rc<TempPath>, target: String },
    /// Remove a file, then any directories left empty.
    DeleteFile { target: String },
}

impl CommitAction {
    pub(crate) fn run(&self, root: &Path) -> Result<()> {
        match self {
            CommitAction::Promote { staged, target } => {
                let dest = root.join(target);
                create_parent(&dest)?;
                std::fs::rename(staged, &dest)?;
            }
            CommitAction::CopyFile { source, target } => {
                let dest = root.join(target);
                create_parent(&dest)?;
                std::fs::copy(&**source, &dest)?;
            }
            CommitAction::DeleteFile { target } => {
                let dest = root.join(target);
                match std::fs::remove_file(&dest) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                prune_empty_dirs(root, dest.parent());
            }
        }
        Ok(())
    }
}

impl fmt::Display for CommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitAction::Promote { target, .. } => write!(f, "write {target}"),
            CommitAction::CopyFile { target, .. } => write!(f, "copy {target}"),
            CommitAction::DeleteFile { target } => write!(f, "delete {target}"),
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Remove empty directories from `dir` upwards, stopping below `root`.
fn prune_empty_dirs(root: &Path, dir: Option<&Path>) {
    let mut current = dir;
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if std::fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_promote_creates_directories() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("staged.yaml");
        std::fs::write(&staged, "a: 1\n").unwrap();

        CommitAction::Promote {
            staged: staged.clone(),
            target: "authors/x/author.yaml".into(),
        }
        .run(dir.path())
        .unwrap();

        assert!(!staged.exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("authors/x/author.yaml")).unwrap(),
            "a: 1\n"
        );
    }

    #[test]
    fn test_delete_prunes_empty_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("authors/x/emails/y")).unwrap();
        std::fs::write(dir.path().join("authors/x/emails/y/email.yaml"), "").unwrap();
        std::fs::write(dir.path().join("authors/x/author.yaml"), "").unwrap();

        CommitAction::DeleteFile {
            target: "authors/x/emails/y/email.yaml".into(),
        }
        .run(dir.path())
        .unwrap();
        assert!(!dir.path().join("authors/x/emails").exists());
        assert!(dir.path().join("authors/x/author.yaml").exists());

        // Already gone is fine.
        CommitAction::DeleteFile {
            target: "authors/x/emails/y/email.yaml".into(),
        }
        .run(dir.path())
        .unwrap();
    }
}
