// Chain of documents being (de)serialized, innermost last. Each frame lives
// on the stack of the translation call that pushed it, so popping happens
// when that call returns, whatever the outcome.

use crate::document::Document;
use crate::error::{Result, StoreError};

#[derive(Clone, Copy, Default)]
pub struct Owners<'a> {
    frame: Option<&'a Frame<'a>>,
}

struct Frame<'a> {
    doc: &'a Document,
    up: Option<&'a Frame<'a>>,
}

impl<'a> Owners<'a> {
    /// Empty chain.
    pub fn root() -> Self {
        Owners { frame: None }
    }

    /// Run `f` with `doc` pushed as the innermost owner.
    pub fn with<R>(&self, doc: &Document, f: impl FnOnce(Owners<'_>) -> R) -> R {
        let frame = Frame {
            doc,
            up: self.frame,
        };
        f(Owners {
            frame: Some(&frame),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
    }

    fn iter(&self) -> impl Iterator<Item = &'a Document> {
        std::iter::successors(self.frame, |f| f.up).map(|f| f.doc)
    }

    /// `Author uuid=... > AuthorTwitter`, outermost first.
    pub fn clean_repr(&self) -> String {
        if self.is_empty() {
            return "<root>".to_string();
        }
        let mut labels: Vec<String> = self.iter().map(Document::label).collect();
        labels.reverse();
        labels.join(" > ")
    }

    /// Nearest owner stored in its own file.
    pub fn nearest_stored(&self) -> Option<&'a Document> {
        self.iter().find(|d| d.class().is_file_backed())
    }

    /// Directory of the nearest file-backed owner, relative to the store root.
    pub fn dirname(&self) -> Result<String> {
        let owner = self.nearest_stored().ok_or_else(|| {
            StoreError::Other(format!("{}: no file-backed owner", self.clean_repr()))
        })?;
        let filename = owner.filename()?;
        Ok(match filename.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => String::new(),
        })
    }

    /// Resolve `rel` against [`dirname`](Self::dirname).
    pub fn in_owner_join(&self, rel: &str) -> Result<String> {
        let dir = self.dirname()?;
        Ok(if dir.is_empty() {
            rel.to_string()
        } else {
            format!("{dir}/{rel}")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_push_and_pop() {
        let models = testing::models();
        let author = testing::author(&models, "alice");
        let twitter = Document::new(&models.twitter).unwrap();

        let root = Owners::root();
        assert_eq!(root.clean_repr(), "<root>");

        let repr = root.with(&author, |o| {
            o.with(&twitter, |inner| {
                assert!(inner.nearest_stored().unwrap().ptr_eq(&author));
                inner.clean_repr()
            })
        });
        assert_eq!(
            repr,
            format!("Author uuid={} > AuthorTwitter", author.uuid().unwrap())
        );
        assert!(root.is_empty());
    }

    #[test]
    fn test_resolves_against_nearest_file_backed_owner() {
        let models = testing::models();
        let author = testing::author(&models, "alice");
        let twitter = Document::new(&models.twitter).unwrap();
        let uuid = author.uuid().unwrap();

        let joined = Owners::root().with(&author, |o| {
            o.with(&twitter, |inner| inner.in_owner_join("avatar.png"))
        });
        assert_eq!(joined.unwrap(), format!("authors/{uuid}/avatar.png"));

        let orphan = Owners::root().with(&twitter, |o| o.dirname());
        assert!(orphan.is_err());
    }

    #[test]
    fn test_inline_owner_without_parent_cannot_resolve() {
        let models = testing::models();
        let email = Document::new(&models.email).unwrap();
        let err = Owners::root()
            .with(&email, |o| o.in_owner_join("key.pem"))
            .unwrap_err();
        assert!(matches!(err, StoreError::ParentNotSet { .. }));
    }
}
