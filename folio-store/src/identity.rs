use regex::Regex;
use std::sync::OnceLock;

/// Textual pattern every document identifier follows (lowercase UUID v4 form).
pub const UUID_PATTERN: &str =
    "[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}";

/// Generate a fresh document identifier.
pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Whether `value` is a well-formed document identifier.
pub fn is_uuid(value: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{UUID_PATTERN}$")).expect("static pattern"))
        .is_match(value)
}

pub(crate) fn new_uuid_value() -> serde_yaml::Value {
    serde_yaml::Value::String(new_uuid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uuid_is_valid() {
        let id = new_uuid();
        assert!(is_uuid(&id), "{id}");
        assert_ne!(id, new_uuid());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(!is_uuid("wed"));
        assert!(!is_uuid("123"));
        assert!(!is_uuid("A1B2C3D4-0000-0000-0000-000000000000"));
        assert!(!is_uuid(" 0a1b2c3d-0000-4000-8000-000000000000"));
    }
}
