// Model classes: compiled schema plus storage layout, and the registry that
// resolves class names found in stored references.

use crate::error::{Result, StoreError};
use crate::field::{Field, FieldValue};
use crate::identity;
use crate::path_template::{ancestor_key, PathSegment, PathTemplate};
use crate::schema::{self, CompiledSchema, DefaultValue, FieldKind, FieldSpec, Marker, Schema};
use heck::ToSnakeCase;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Name of the implicit identifier field of file-backed classes.
pub const UUID_FIELD: &str = "uuid";

/// A document class: name, compiled schema and, for file-backed classes,
/// where its documents live on disk.
pub struct ModelClass {
    name: String,
    schema: CompiledSchema,
    layout: Option<Layout>,
}

/// Storage layout of a file-backed class.
#[derive(Debug, Clone)]
pub struct Layout {
    pub template: PathTemplate,
    /// Set for inline classes, whose documents are owned by a parent document.
    pub parent: Option<ParentLink>,
}

#[derive(Debug, Clone)]
pub struct ParentLink {
    /// Snake-case parent class name, used in the `{<name>_uuid}` placeholder.
    pub name: String,
    pub class: Rc<ModelClass>,
}

impl ModelClass {
    pub fn builder(name: &str) -> ModelClassBuilder {
        ModelClassBuilder {
            name: name.to_string(),
            schema: Schema::new(),
            placement: Placement::Embedded,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &CompiledSchema {
        &self.schema
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn is_file_backed(&self) -> bool {
        self.layout.is_some()
    }

    pub fn parent_link(&self) -> Option<&ParentLink> {
        self.layout.as_ref().and_then(|l| l.parent.as_ref())
    }

    /// Placeholder keys of every owning ancestor, outermost first.
    pub fn ancestor_keys(&self) -> Vec<String> {
        match &self.layout {
            Some(layout) => layout
                .template
                .segments
                .iter()
                .filter_map(|s| match s {
                    PathSegment::AncestorUuid(name) => Some(ancestor_key(name)),
                    _ => None,
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Typed accessor for a declared dotted path. Keys declared read-only,
    /// such as the identifier, always yield a read-only accessor.
    pub fn field<T: FieldValue>(self: &Rc<Self>, path: &str) -> Result<Field<T>> {
        self.accessor(path, false)
    }

    /// Like [`field`](Self::field), but writes and deletes are refused.
    pub fn read_only_field<T: FieldValue>(self: &Rc<Self>, path: &str) -> Result<Field<T>> {
        self.accessor(path, true)
    }

    /// The implicit identifier of a file-backed class.
    pub fn uuid_field(self: &Rc<Self>) -> Result<Field<String>> {
        if !self.is_file_backed() {
            return Err(StoreError::NotFileBacked {
                document: self.name.clone(),
            });
        }
        self.field(UUID_FIELD)
    }

    fn accessor<T: FieldValue>(self: &Rc<Self>, path: &str, read_only: bool) -> Result<Field<T>> {
        let info = self.schema.key_info(path).ok_or_else(|| {
            StoreError::Definition(format!("{}: field not found {path}", self.name))
        })?;
        Ok(Field::new(
            Rc::clone(self),
            path,
            info.kind.clone(),
            read_only || info.read_only,
        ))
    }
}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelClass").field(&self.name).finish()
    }
}

enum Placement {
    Embedded,
    TopLevel(String),
    Inline(Rc<ModelClass>, String),
}

pub struct ModelClassBuilder {
    name: String,
    schema: Schema,
    placement: Placement,
}

impl ModelClassBuilder {
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Store documents as their own files, e.g. `authors/{uuid}/author.yaml`.
    pub fn layout(mut self, pattern: &str) -> Self {
        self.placement = Placement::TopLevel(pattern.to_string());
        self
    }

    /// Store documents as files owned by a `parent` document, e.g.
    /// `emails/{uuid}/email.yaml` nested under the parent's directory.
    pub fn inline_in(mut self, parent: &Rc<ModelClass>, pattern: &str) -> Self {
        self.placement = Placement::Inline(Rc::clone(parent), pattern.to_string());
        self
    }

    pub fn build(self) -> Result<Rc<ModelClass>> {
        if self.name.is_empty() {
            return Err(StoreError::Definition("model name cannot be empty".into()));
        }

        let layout = match self.placement {
            Placement::Embedded => None,
            Placement::TopLevel(pattern) => Some(Layout {
                template: PathTemplate::parse(&pattern)?,
                parent: None,
            }),
            Placement::Inline(parent, pattern) => {
                let parent_layout = parent.layout().ok_or_else(|| {
                    StoreError::Definition(format!(
                        "{}: parent class {} is not file-backed",
                        self.name,
                        parent.name()
                    ))
                })?;
                let name = parent.name().to_snake_case();
                let template = PathTemplate::nested_under(
                    &parent_layout.template,
                    &name,
                    &PathTemplate::parse(&pattern)?,
                );
                Some(Layout {
                    template,
                    parent: Some(ParentLink {
                        name,
                        class: parent,
                    }),
                })
            }
        };

        let mut schema = self.schema;
        if layout.is_some() {
            if schema.get(UUID_FIELD).is_some() {
                return Err(StoreError::Definition(format!(
                    "{}: field '{UUID_FIELD}' is reserved for file-backed models",
                    self.name
                )));
            }
            schema.fields.insert(
                0,
                FieldSpec {
                    name: UUID_FIELD.to_string(),
                    marker: Marker::Required,
                    default: Some(DefaultValue::Factory(identity::new_uuid_value)),
                    kind: FieldKind::uuid(),
                    read_only: true,
                },
            );
        }

        Ok(Rc::new(ModelClass {
            name: self.name,
            schema: schema::compile(&schema)?,
            layout,
        }))
    }
}

/// Class names known to a store, used to resolve stored references.
#[derive(Debug, Default)]
pub struct Registry {
    classes: BTreeMap<String, Rc<ModelClass>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: &Rc<ModelClass>) -> Result<()> {
        if self.classes.contains_key(class.name()) {
            return Err(StoreError::DuplicateClass(class.name().to_string()));
        }
        self.classes
            .insert(class.name().to_string(), Rc::clone(class));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Rc<ModelClass>> {
        self.classes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }
}
