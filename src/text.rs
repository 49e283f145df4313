/// Telegram rejects messages longer than this many UTF-16 code units.
pub(crate) const TELEGRAM_MAX_UNITS: usize = 4096;

const TRUNCATION_MARK: &str = "\n\n(truncated)";

fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Shortens `text` to fit one Telegram message, cutting on a char boundary.
pub(crate) fn truncate_message(text: &str) -> String {
    if utf16_len(text) <= TELEGRAM_MAX_UNITS {
        return text.to_string();
    }
    let budget = TELEGRAM_MAX_UNITS - utf16_len(TRUNCATION_MARK);
    let mut used = 0;
    let mut out: String = text
        .chars()
        .take_while(|c| {
            used += c.len_utf16();
            used <= budget
        })
        .collect();
    out.push_str(TRUNCATION_MARK);
    out
}

/// Collapses every whitespace run to a single space and trims the ends.
pub(crate) fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
