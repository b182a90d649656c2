/// Treats missing and blank query parameters alike.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses a pagination parameter, falling back to `default` when it is
/// missing, malformed or negative.
pub fn parse_or_default(value: Option<&str>, default: i64) -> i64 {
    value
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|parsed| *parsed >= 0)
        .unwrap_or(default)
}

/// Builds an `ILIKE` pattern matching `needle` as a literal substring.
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
