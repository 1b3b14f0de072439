//! Configuration value parsing and validation helpers

use std::time::Duration;

/// Parse a duration string like "500ms", "30s", "5m", "1h30m".
///
/// An empty string or a zero total means "no limit" and yields `None`.
pub fn parse_duration(s: &str) -> Result<Option<Duration>, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }

    let mut total_ms: u64 = 0;
    let mut current_num = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            current_num.push(c);
            continue;
        }

        let num: u64 = current_num
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", s))?;
        current_num.clear();

        let unit_ms = match c {
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                1
            }
            's' => 1_000,
            'm' => 60_000,
            'h' => 3_600_000,
            _ => return Err(format!("Unknown duration unit: {}", c)),
        };
        total_ms = num
            .checked_mul(unit_ms)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(|| format!("Duration too large: {}", s))?;
    }

    if !current_num.is_empty() {
        return Err(format!("Missing unit in duration: {}", s));
    }

    if total_ms == 0 {
        return Ok(None);
    }

    Ok(Some(Duration::from_millis(total_ms)))
}

/// Check that `s` is an absolute http(s) URL.
pub fn validate_http_url(s: &str) -> Result<(), String> {
    let url = url::Url::parse(s).map_err(|e| format!("Invalid URL {}: {}", s, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("Unsupported URL scheme {} in {}", other, s)),
    }
}
