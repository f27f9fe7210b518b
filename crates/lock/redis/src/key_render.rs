/// Render a lock key into a Redis key string with an optional prefix.
///
/// The format is `prefix:key`, or the key unchanged when no prefix is set.
pub fn render_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{key}"),
        _ => key.to_owned(),
    }
}
