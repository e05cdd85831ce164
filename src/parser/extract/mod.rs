pub mod affiliation;
pub mod education;
pub mod experience;
pub mod identity;

use regex::Regex;
use std::sync::LazyLock;

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{4})\b").unwrap());

/// Last 4-digit year in a date range ("2014 - 2018" → "2018").
pub fn last_year(text: &str) -> Option<String> {
    YEAR_RE
        .captures_iter(text)
        .last()
        .map(|c| c[1].to_string())
}

/// Case-insensitive search returning the matched slice of `haystack` verbatim.
pub fn find_verbatim<'a>(haystack: &'a str, needle: &str) -> Option<&'a str> {
    let start = haystack.to_ascii_lowercase().find(&needle.to_ascii_lowercase())?;
    haystack.get(start..start + needle.len())
}
