/// Separator used by the stored and transmitted form of a split list.
pub const SPLIT_SEPARATOR: &str = ", ";

/// Parse the delimited form of a split list into participant names.
///
/// Segments are separated by commas and trimmed; empty segments are dropped,
/// so blank input yields an empty list. Order and repeated names are kept:
/// a name listed twice takes two shares.
pub fn parse_split(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// Bring separately supplied names into the shape they have after a trip
/// through the delimited form: each entry is trimmed, blank entries vanish and
/// an entry holding commas becomes several names.
pub fn normalize_split<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().flat_map(|name| parse_split(name.as_ref())).collect()
}

/// Format participant names into the delimited form, e.g. "alice, bob".
pub fn format_split<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(SPLIT_SEPARATOR)
}
