// Files attached to a document and stored next to it, e.g. article contents.

use crate::error::{Result, StoreError};
use crate::owners::Owners;
use crate::schema::{DefaultValue, Marker, Primitive};
use crate::session::{CommitAction, Session};
use crate::validation::{KeyRule, ObjectRule, Rule};
use serde_yaml::{Mapping, Value};
use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;
use tempfile::{NamedTempFile, TempPath};

/// Handle to an attached file. Clones share state, so content staged
/// through one handle is seen by the document holding another.
#[derive(Debug, Clone)]
pub struct ExternalFile(Rc<RefCell<FileState>>);

#[derive(Debug)]
struct FileState {
    filename: String,
    /// Current label first, then archived ones.
    labels: Vec<String>,
    /// Location relative to the store root, once known.
    path: Option<String>,
    /// New content waiting for the next commit.
    staged: Option<Rc<TempPath>>,
}

impl ExternalFile {
    pub fn new(filename: &str) -> Self {
        ExternalFile(Rc::new(RefCell::new(FileState {
            filename: filename.to_string(),
            labels: Vec::new(),
            path: None,
            staged: None,
        })))
    }

    pub fn with_labels(self, labels: Vec<String>) -> Self {
        self.0.borrow_mut().labels = labels;
        self
    }

    pub fn filename(&self) -> String {
        self.0.borrow().filename.clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.0.borrow().labels.clone()
    }

    pub fn path(&self) -> Option<String> {
        self.0.borrow().path.clone()
    }

    /// Stage a copy of `source` as the new content.
    pub fn copy_from(&self, source: &Path) -> Result<()> {
        let staged = NamedTempFile::new()?.into_temp_path();
        std::fs::copy(source, &staged)?;
        self.0.borrow_mut().staged = Some(Rc::new(staged));
        Ok(())
    }

    /// Stage `content` as the new content.
    pub fn write(&self, content: &[u8]) -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(content)?;
        self.0.borrow_mut().staged = Some(Rc::new(file.into_temp_path()));
        Ok(())
    }

    /// Staged content if any, else the committed file in the store.
    pub fn read_to_string(&self, session: &Session) -> Result<String> {
        let state = self.0.borrow();
        if let Some(staged) = &state.staged {
            return Ok(std::fs::read_to_string(&**staged)?);
        }
        match &state.path {
            Some(path) => Ok(std::fs::read_to_string(session.root().join(path))?),
            None => Err(StoreError::Other(format!(
                "{}: file has no content",
                state.filename
            ))),
        }
    }

    pub(crate) fn load(stored: &Value, owners: Owners<'_>) -> Result<Self> {
        let filename = stored
            .get("filename")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Invalid {
                document: owners.clean_repr(),
                message: "attached file without filename".into(),
            })?;

        let mut labels = Vec::new();
        if let Some(label) = stored.get("label") {
            if let Some(current) = label.get("current").and_then(Value::as_str) {
                labels.push(current.to_string());
            }
            if let Some(archive) = label.get("archive").and_then(Value::as_sequence) {
                labels.extend(archive.iter().filter_map(Value::as_str).map(str::to_string));
            }
        }

        let file = ExternalFile::new(filename).with_labels(labels);
        // Inline owners without a parent have no location yet.
        file.0.borrow_mut().path = owners.in_owner_join(filename).ok();
        Ok(file)
    }

    pub(crate) fn dump(
        &self,
        session: Option<&Session>,
        owners: Owners<'_>,
        persist: bool,
    ) -> Result<Value> {
        if persist {
            let staged = self.0.borrow().staged.clone();
            if let (Some(source), Some(session)) = (staged, session) {
                let target = owners.in_owner_join(&self.filename())?;
                session.queue(CommitAction::CopyFile {
                    source,
                    target: target.clone(),
                });
                self.0.borrow_mut().path = Some(target);
            }
        }

        let state = self.0.borrow();
        let mut mapping = Mapping::new();
        mapping.insert("filename".into(), state.filename.clone().into());
        if let Some((current, archive)) = state.labels.split_first() {
            let mut label = Mapping::new();
            label.insert("current".into(), current.clone().into());
            label.insert(
                "archive".into(),
                Value::Sequence(archive.iter().cloned().map(Value::from).collect()),
            );
            mapping.insert("label".into(), Value::Mapping(label));
        }
        Ok(Value::Mapping(mapping))
    }
}

impl PartialEq for ExternalFile {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        let (a, b) = (self.0.borrow(), other.0.borrow());
        a.filename == b.filename && a.labels == b.labels
    }
}

/// Validation rule of the stored form.
pub fn stored_rule() -> ObjectRule {
    let string = || Rule::Primitive(Primitive::String);
    let label = ObjectRule {
        keys: vec![
            KeyRule {
                name: "current".into(),
                marker: Marker::Optional,
                default: None,
                rule: string(),
            },
            KeyRule {
                name: "archive".into(),
                marker: Marker::Optional,
                default: Some(DefaultValue::empty_list()),
                rule: Rule::List(Box::new(string())),
            },
        ],
        allow_extra: false,
    };
    ObjectRule {
        keys: vec![
            KeyRule {
                name: "filename".into(),
                marker: Marker::Required,
                default: None,
                rule: string(),
            },
            KeyRule {
                name: "label".into(),
                marker: Marker::Optional,
                default: None,
                rule: Rule::Object(Rc::new(label)),
            },
        ],
        allow_extra: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::testing;
    use crate::validation;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_stored_form_defaults_archive() {
        let stored: Value = serde_yaml::from_str("filename: a.md\nlabel: {current: v2}").unwrap();
        let result = validation::validate_document(&stored_rule(), &stored);
        assert!(result.is_ok());
        assert_eq!(
            result.value,
            serde_yaml::from_str::<Value>("filename: a.md\nlabel: {current: v2, archive: []}")
                .unwrap()
        );
    }

    #[test]
    fn test_load_resolves_path_and_labels() {
        let models = testing::models();
        let article = Document::new(&models.article).unwrap();
        let stored: Value =
            serde_yaml::from_str("filename: a.md\nlabel: {current: v2, archive: [v1]}").unwrap();

        let file = Owners::root()
            .with(&article, |o| ExternalFile::load(&stored, o))
            .unwrap();
        assert_eq!(file.labels(), vec!["v2", "v1"]);
        assert_eq!(
            file.path().unwrap(),
            format!("articles/{}/a.md", article.uuid().unwrap())
        );

        let dumped = Owners::root()
            .with(&article, |o| file.dump(None, o, false))
            .unwrap();
        assert_eq!(dumped, stored);
    }

    #[test]
    fn test_staged_content_is_copied_at_commit() {
        let dir = TempDir::new().unwrap();
        let (models, store) = testing::store(dir.path());
        let session = store.session().unwrap();

        let article = testing::article(&models, "# Hello\n\nworld");
        let contents = models
            .article
            .field::<ExternalFile>("contents")
            .unwrap()
            .get(&article)
            .unwrap();
        assert_eq!(contents.read_to_string(&session).unwrap(), "# Hello\n\nworld");

        session
            .read_write(|s| -> Result<()> {
                s.add([&article])?;
                Ok(())
            })
            .unwrap();

        let target = dir
            .path()
            .join(format!("articles/{}/contents.md", article.uuid().unwrap()));
        assert_eq!(std::fs::read_to_string(target).unwrap(), "# Hello\n\nworld");
    }
}
