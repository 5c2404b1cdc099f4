mod compiler;
mod types;

pub(crate) use compiler::kind_rule;
pub use compiler::{compile, CompiledSchema, KeyInfo};
pub use types::{DefaultValue, FieldKind, FieldSpec, Marker, Primitive, Schema};
