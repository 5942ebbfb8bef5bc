pub fn get_version_string() -> String {
    format!(
        "{} ({}-{})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COUNT"),
        env!("GIT_HASH")
    )
}

/// Trim a remote response body down to something that fits in an error message.
pub fn truncate_body(body: &str, limit: usize) -> String {
    let body = body.trim();
    if body.len() <= limit {
        return body.to_string();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
