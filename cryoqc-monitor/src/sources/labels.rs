//! Column label normalization
//!
//! Stores describe their columns with internal property paths such as
//! `_acquisition._voltage` or `_ctffind4_crossCorrelation`. Normalizing splits
//! camel-case boundaries into words, replaces punctuation with spaces, collapses
//! whitespace and title-cases every word, giving `Acquisition Voltage` and
//! `Ctffind4 Cross Correlation`.

/// Normalize an internal label into a human-readable one
pub fn normalize_label(raw: &str) -> String {
    let mut spaced = String::with_capacity(raw.len() + 8);
    let mut prev: Option<char> = None;

    for c in raw.chars() {
        if c.is_uppercase() && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
            spaced.push(' ');
        }
        spaced.push(if c.is_alphanumeric() || c.is_whitespace() {
            c
        } else {
            ' '
        });
        prev = Some(c);
    }

    spaced
        .split_whitespace()
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
