// Blog models shared by the unit tests.

use crate::document::Document;
use crate::external_file::ExternalFile;
use crate::model::{ModelClass, Registry};
use crate::reference::RefSpec;
use crate::schema::{DefaultValue, FieldKind, Schema};
use crate::store::Store;
use std::path::Path;
use std::rc::Rc;

pub struct Models {
    pub author: Rc<ModelClass>,
    pub twitter: Rc<ModelClass>,
    pub email: Rc<ModelClass>,
    pub category: Rc<ModelClass>,
    pub article: Rc<ModelClass>,
}

impl Models {
    pub fn registry(&self) -> Registry {
        let mut registry = Registry::new();
        for class in [
            &self.author,
            &self.twitter,
            &self.email,
            &self.category,
            &self.article,
        ] {
            registry.register(class).unwrap();
        }
        registry
    }
}

pub fn models() -> Models {
    let twitter = ModelClass::builder("AuthorTwitter")
        .schema(Schema::new().required("handle", FieldKind::string()))
        .build()
        .unwrap();

    let handles = Schema::new()
        .required("current", FieldKind::string())
        .required_or(
            "archive",
            FieldKind::list(FieldKind::string()),
            DefaultValue::empty_list(),
        );
    let identity = Schema::new()
        .required("handles", FieldKind::object(handles))
        .required_or("name", FieldKind::string(), DefaultValue::string(""))
        .required_or("short-name", FieldKind::string(), DefaultValue::string(""));
    let social = Schema::new().optional("twitter", FieldKind::document(&twitter));
    let author = ModelClass::builder("Author")
        .schema(
            Schema::new()
                .required("identity", FieldKind::object(identity))
                .optional("social", FieldKind::object(social)),
        )
        .layout("authors/{uuid}/author.yaml")
        .build()
        .unwrap();

    let email = ModelClass::builder("AuthorEmail")
        .schema(
            Schema::new()
                .required("email", FieldKind::email())
                .required_or(
                    "label",
                    FieldKind::one_of(&["personal", "business"]),
                    DefaultValue::string("personal"),
                )
                .required_or("is_primary", FieldKind::boolean(), DefaultValue::bool(false)),
        )
        .inline_in(&author, "emails/{uuid}/email.yaml")
        .build()
        .unwrap();

    let category = ModelClass::builder("Category")
        .schema(
            Schema::new()
                .required("name", FieldKind::string())
                .optional(
                    "parent-category",
                    FieldKind::reference(RefSpec::new(["Category"]).unwrap()),
                ),
        )
        .layout("categories/{uuid}/category.yaml")
        .build()
        .unwrap();

    let slugs = Schema::new()
        .required("current", FieldKind::string())
        .required_or(
            "archive",
            FieldKind::list(FieldKind::string()),
            DefaultValue::empty_list(),
        );
    let article = ModelClass::builder("Article")
        .schema(
            Schema::new()
                .required("slugs", FieldKind::object(slugs))
                .required_or(
                    "authors",
                    FieldKind::list(FieldKind::reference(RefSpec::to(&author))),
                    DefaultValue::empty_list(),
                )
                .optional("category", FieldKind::reference(RefSpec::to(&category)))
                .required_or(
                    "tags",
                    FieldKind::list(FieldKind::string()),
                    DefaultValue::empty_list(),
                )
                .required("contents", FieldKind::file()),
        )
        .layout("articles/{uuid}/article.yaml")
        .build()
        .unwrap();

    Models {
        author,
        twitter,
        email,
        category,
        article,
    }
}

pub fn store(root: &Path) -> (Models, Store) {
    let models = models();
    let store = Store::open(root, models.registry()).unwrap();
    (models, store)
}

pub fn author(models: &Models, handle: &str) -> Document {
    let author = Document::new(&models.author).unwrap();
    author
        .set("identity.handles.current", handle.to_string())
        .unwrap();
    author
}

pub fn email(models: &Models, author: &Document, address: &str) -> Document {
    let email = Document::new_inline(&models.email, author).unwrap();
    email.set("email", address.to_string()).unwrap();
    email
}

pub fn category(models: &Models, name: &str) -> Document {
    let category = Document::new(&models.category).unwrap();
    category.set("name", name.to_string()).unwrap();
    category
}

pub fn article(models: &Models, contents: &str) -> Document {
    let article = Document::new(&models.article).unwrap();
    article
        .set("slugs.current", "hello".to_string())
        .unwrap();
    let file = ExternalFile::new("contents.md");
    file.write(contents.as_bytes()).unwrap();
    article.set("contents", file).unwrap();
    article
}
