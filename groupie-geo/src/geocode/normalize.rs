//! Location key normalization.
//!
//! The concert API still uses a few place names that no longer exist, and
//! the geocoding service cannot find them. They are rewritten to their
//! current names before lookup and before touching the cache.

use std::borrow::Cow;

/// Known outdated keys and their replacements. Matched case-insensitively
/// against the whole key.
const RENAMES: &[(&str, &str)] = &[
    ("willemstad-netherlands_antilles", "willemstad-curacao"),
    ("netherlands_antilles", "curacao"),
];

/// Rewrites a known outdated key to its canonical form.
///
/// Unknown keys are returned unchanged (not lowercased). Applying the
/// function twice gives the same result as applying it once.
pub fn normalize_key(key: &str) -> Cow<'_, str> {
    let lowered = key.to_ascii_lowercase();
    match RENAMES.iter().find(|(from, _)| *from == lowered) {
        Some((_, to)) => {
            tracing::debug!(from = key, to = *to, "Location normalized");
            Cow::Borrowed(to)
        }
        None => Cow::Borrowed(key),
    }
}

/// Converts a location key to a free-text search query.
pub fn to_query(key: &str) -> String {
    key.replace('_', " ")
}
