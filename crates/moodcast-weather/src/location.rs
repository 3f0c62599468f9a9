//! Location query normalization.

/// Canonical cache key for a location query.
///
/// Trims, lowercases, collapses runs of whitespace and tidies comma spacing,
/// so `"  New   York ,US"` and `"new york, us"` share one key.
pub fn normalize_location_key(query: &str) -> String {
    query
        .split(',')
        .map(|part| {
            part.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
