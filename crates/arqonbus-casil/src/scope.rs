/// Whether `scope_key` (a `room:channel` pair, or `_direct:client_id` for
/// direct messages) falls within CASIL's configured scope (§4.5 step 1).
///
/// An empty `include` list means everything is in scope by default;
/// `exclude` always wins over `include`.
pub fn in_scope(scope_key: &str, include: &[String], exclude: &[String]) -> bool {
    if exclude.iter().any(|pat| glob_match(pat, scope_key)) {
        return false;
    }
    if include.is_empty() {
        return true;
    }
    include.iter().any(|pat| glob_match(pat, scope_key))
}

/// Glob matching supporting `*` as a wildcard for any sequence of chars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => {
                if i == 0 && idx != 0 {
                    return false;
                }
                pos += idx + part.len();
            },
            None => return false,
        }
    }
    if !parts.last().unwrap_or(&"").is_empty() {
        pos == text.len()
    } else {
        true
    }
}
