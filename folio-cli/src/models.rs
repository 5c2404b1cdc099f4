use folio_store::{DefaultValue, FieldKind, ModelClass, RefSpec, Registry, Result, Schema};
use std::rc::Rc;

pub const EMAIL_LABELS: [&str; 2] = ["personal", "business"];

/// Model classes of the blog.
pub struct Blog {
    pub author: Rc<ModelClass>,
    pub twitter: Rc<ModelClass>,
    pub email: Rc<ModelClass>,
    pub category: Rc<ModelClass>,
    pub article: Rc<ModelClass>,
}

impl Blog {
    pub fn declare() -> Result<Blog> {
        let twitter = ModelClass::builder("AuthorTwitter")
            .schema(Schema::new().required("handle", FieldKind::string()))
            .build()?;

        let author = ModelClass::builder("Author")
            .schema(
                Schema::new()
                    .required(
                        "identity",
                        FieldKind::object(
                            Schema::new()
                                .required("handles", FieldKind::object(history()))
                                .required_or("name", FieldKind::string(), DefaultValue::string(""))
                                .required_or(
                                    "short-name",
                                    FieldKind::string(),
                                    DefaultValue::string(""),
                                ),
                        ),
                    )
                    .optional(
                        "social",
                        FieldKind::object(
                            Schema::new().optional("twitter", FieldKind::document(&twitter)),
                        ),
                    ),
            )
            .layout("authors/{uuid}/author.yaml")
            .build()?;

        let email = ModelClass::builder("AuthorEmail")
            .schema(
                Schema::new()
                    .required("email", FieldKind::email())
                    .required_or(
                        "label",
                        FieldKind::one_of(&EMAIL_LABELS),
                        DefaultValue::string(EMAIL_LABELS[0]),
                    )
                    .required_or("is_primary", FieldKind::boolean(), DefaultValue::bool(false)),
            )
            .inline_in(&author, "emails/{uuid}/email.yaml")
            .build()?;

        let category = ModelClass::builder("Category")
            .schema(
                Schema::new()
                    .required("name", FieldKind::string())
                    .optional(
                        "parent-category",
                        FieldKind::reference(RefSpec::new(["Category"])?),
                    ),
            )
            .layout("categories/{uuid}/category.yaml")
            .build()?;

        let article = ModelClass::builder("Article")
            .schema(
                Schema::new()
                    .required("slugs", FieldKind::object(history()))
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
            .build()?;

        Ok(Blog {
            author,
            twitter,
            email,
            category,
            article,
        })
    }

    pub fn registry(&self) -> Result<Registry> {
        let mut registry = Registry::new();
        for class in [
            &self.author,
            &self.twitter,
            &self.email,
            &self.category,
            &self.article,
        ] {
            registry.register(class)?;
        }
        Ok(registry)
    }
}

/// `{current, archive}` pair used by handles and slugs.
fn history() -> Schema {
    Schema::new()
        .required("current", FieldKind::string())
        .required_or(
            "archive",
            FieldKind::list(FieldKind::string()),
            DefaultValue::empty_list(),
        )
}
