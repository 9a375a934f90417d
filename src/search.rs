use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::member::Member;

/// Fold text for comparison: decompose, strip diacritics, lowercase.
pub fn normalize_text(input: &str) -> String {
    input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Members whose name contains `query`, ignoring case and accents.
/// An empty query matches everyone.
pub fn filter_by_name<'a>(members: &'a [Member], query: &str) -> Vec<&'a Member> {
    let needle = normalize_text(query);

    members
        .iter()
        .filter(|m| normalize_text(&m.name).contains(&needle))
        .collect()
}
