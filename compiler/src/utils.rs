use serde_json;

/// Quote a name for use in a diagnostic message.
pub fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap()
}
