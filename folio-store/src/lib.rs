pub mod error;
pub mod identity;
pub mod schema;
pub mod validation;
pub mod path_template;
pub mod model;
pub mod field;
pub mod owners;
pub mod reference;
pub mod document;
pub mod external_file;
pub mod query;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use document::{Document, Value};
pub use error::{Result, StoreError};
pub use external_file::ExternalFile;
pub use field::{and, or, Field, FieldPath, FieldValue, Predicate};
pub use model::{ModelClass, Registry};
pub use query::Query;
pub use reference::{RefPayload, RefSpec, Reference};
pub use schema::{DefaultValue, FieldKind, Schema};
pub use session::{Mode, Session};
pub use store::Store;
