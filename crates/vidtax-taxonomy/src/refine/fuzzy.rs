/// Whether a draft category name belongs to a canonical one.
///
/// Case-insensitive: equal, either contains the other, or equal once a
/// trailing `s` run is stripped from both.
pub fn fuzzy_matches(draft: &str, canonical: &str) -> bool {
    let d = draft.trim().to_lowercase();
    let c = canonical.trim().to_lowercase();
    if d.is_empty() || c.is_empty() {
        return d == c;
    }
    d == c || d.contains(&c) || c.contains(&d) || d.trim_end_matches('s') == c.trim_end_matches('s')
}
