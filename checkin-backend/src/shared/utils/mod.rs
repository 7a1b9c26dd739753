pub fn mask_pii(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let len = trimmed.chars().count();
    format!("<redacted len={}>", len)
}

/// First eight hex chars of a content hash, enough to correlate log lines.
pub fn short_key(key: &str) -> &str {
    let end = key
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(key.len());
    &key[..end]
}

/// Rounds to two decimal places, the precision every score and confidence is reported with.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Truncates on a char boundary, appending `...` when something was cut.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &value[..idx]),
        None => value.to_string(),
    }
}

/// Elapsed milliseconds rounded up, so any work that ran at all reports at least 1ms.
pub fn ceil_millis(elapsed: std::time::Duration) -> u64 {
    let micros = elapsed.as_micros();
    u64::try_from(micros.div_ceil(1000)).unwrap_or(u64::MAX)
}
