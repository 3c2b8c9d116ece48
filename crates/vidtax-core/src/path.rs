use std::fmt;

/// Separator used when displaying or keying a path.
pub const PATH_SEPARATOR: &str = " > ";

const SEGMENT_DELIMITER: char = '>';

/// Ordered, non-empty sequence of trimmed category names.
///
/// Case is preserved as written; comparisons go through [`normalize_segment`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HierarchicalPath {
    segments: Vec<String>,
}

impl HierarchicalPath {
    /// Parse a `>`-delimited path. Blank segments are dropped; `None` when nothing remains.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::from_segments(raw.split(SEGMENT_DELIMITER))
    }

    pub fn from_segments<I, S>(segments: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments: Vec<String> = segments
            .into_iter()
            .map(|s| s.as_ref().trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Lookup key: normalized segments joined by [`PATH_SEPARATOR`].
    pub fn normalized_key(&self) -> String {
        self.segments
            .iter()
            .map(|s| normalize_segment(s))
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR)
    }
}

impl fmt::Display for HierarchicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(PATH_SEPARATOR))
    }
}

/// Trim, lower-case and collapse internal whitespace runs to a single space.
pub fn normalize_segment(segment: &str) -> String {
    segment
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalized lookup key for a raw path string.
pub fn normalize_path_key(raw: &str) -> Option<String> {
    HierarchicalPath::parse(raw).map(|p| p.normalized_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_drops_blank_segments() {
        let p = HierarchicalPath::parse("  Gaming >Esports >  > Apex Legends ").unwrap();
        assert_eq!(p.segments(), ["Gaming", "Esports", "Apex Legends"]);
        assert_eq!(p.to_string(), "Gaming > Esports > Apex Legends");
        assert!(HierarchicalPath::parse(" > ").is_none());
    }

    #[test]
    fn normalized_key_is_case_and_space_insensitive() {
        assert_eq!(
            normalize_path_key("gaming > esports >  Apex   Legends").as_deref(),
            Some("gaming > esports > apex legends")
        );
        assert_eq!(
            normalize_path_key("GAMING>ESPORTS>apex legends"),
            normalize_path_key("gaming > esports > apex legends")
        );
    }
}
