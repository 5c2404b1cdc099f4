use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    // ── Documents ────────────────────────────────────────────────────
    #[error("{document}: {message}")]
    Invalid { document: String, message: String },

    #[error("{document}: not a file-backed document")]
    NotFileBacked { document: String },

    // ── Fields ───────────────────────────────────────────────────────
    #[error("field not found {path}")]
    MissingField { path: String },

    #[error("field {path} is read-only")]
    ReadOnlyField { path: String },

    #[error("field {path} does not hold a value of type {expected}")]
    FieldType { path: String, expected: &'static str },

    // ── Ownership ────────────────────────────────────────────────────
    #[error("{document}: parent already set")]
    ParentAlreadySet { document: String },

    #[error("{document}: no parent defined")]
    NoParentDeclared { document: String },

    #[error("{document}: type {found} is not expected parent type {expected}")]
    WrongParentType {
        document: String,
        expected: String,
        found: String,
    },

    #[error("{document}: parent must be set before the storage path is known")]
    ParentNotSet { document: String },

    // ── References ───────────────────────────────────────────────────
    #[error("{owners}: error with reference {reference}: object of type \"{class}\" is not in {}", quoted(.allowed))]
    WrongClass {
        owners: String,
        reference: String,
        class: String,
        allowed: Vec<String>,
    },

    #[error("{owners}: error with reference {reference}: object referenced is not in session")]
    NotInSession { owners: String, reference: String },

    #[error("{owners}: error with reference {reference}: no session provided when (de)referencing")]
    NoSession { owners: String, reference: String },

    // ── Queries ──────────────────────────────────────────────────────
    #[error("no {class} object found")]
    NoObjectFound { class: String },

    #[error("expected one {class} object, found {count}")]
    TooManyObjects { class: String, count: usize },

    #[error("invalid query criterion: {0}")]
    InvalidCriterion(String),

    #[error("query on {class}: model has no parent")]
    QueryNoParent { class: String },

    #[error("query on {class}: parent already set")]
    QueryParentAlreadySet { class: String },

    #[error("query on {class}: type {found} is not expected parent type {expected}")]
    QueryParentWrongType {
        class: String,
        expected: String,
        found: String,
    },

    // ── Sessions ─────────────────────────────────────────────────────
    #[error("content root {root} is locked by another read-write session")]
    Locked { root: String },

    #[error("session is read-only")]
    SessionReadOnly,

    // ── Definitions ──────────────────────────────────────────────────
    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Invalid model name {0} used for two models")]
    DuplicateClass(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("{0}")]
    Other(String),
}

fn quoted(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, StoreError>;
