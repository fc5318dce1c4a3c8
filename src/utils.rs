pub fn format_store_key(prefix: &str, key: &str) -> String {
    format!("{}:{}", prefix, key)
}

/// Upper-cased country code, or `None` for the values edge networks use
/// when the origin is unknown.
pub fn normalize_country(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() || code.eq_ignore_ascii_case("XX") {
        return None;
    }
    Some(code.to_ascii_uppercase())
}
