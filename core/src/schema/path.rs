//! Field paths used to locate violations inside a payload.

use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;

/// One step into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object member
    Key(String),
    /// Array element
    Index(usize),
}

/// Location of a value inside a payload, displayed as `credits[0].job`.
///
/// The root path displays as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(SmallVec<[PathSegment; 4]>);

impl FieldPath {
    /// The root of the payload.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Check if this is the root path
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path segments from the root.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Child path for an object member.
    #[must_use]
    pub fn key(&self, name: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.0.push(PathSegment::Key(name.into()));
        child
    }

    /// Child path for an array element.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut child = self.clone();
        child.0.push(PathSegment::Index(index));
        child
    }

    /// Append a relative path.
    #[must_use]
    pub fn join(&self, relative: &Self) -> Self {
        let mut joined = self.clone();
        joined.0.extend(relative.0.iter().cloned());
        joined
    }
}

impl From<&str> for FieldPath {
    /// Parse a dotted path. Bracketed numbers become index segments:
    /// `"credits[0].job"` → `credits`, `0`, `job`.
    fn from(raw: &str) -> Self {
        let mut path = Self::root();
        for part in raw.split('.').filter(|p| !p.is_empty()) {
            let mut pieces = part.split('[');
            if let Some(name) = pieces.next().filter(|n| !n.is_empty()) {
                path.0.push(PathSegment::Key(name.to_string()));
            }
            for piece in pieces {
                let digits = piece.trim_end_matches(']');
                match digits.parse::<usize>() {
                    Ok(index) => path.0.push(PathSegment::Index(index)),
                    Err(_) => path.0.push(PathSegment::Key(digits.to_string())),
                }
            }
        }
        path
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(name) if position == 0 => write!(f, "{name}")?,
                PathSegment::Key(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mixes_keys_and_indices() {
        let path = FieldPath::root().key("credits").index(0).key("job");
        assert_eq!(path.to_string(), "credits[0].job");
    }

    #[test]
    fn test_parse_round_trips_display() {
        let path = FieldPath::from("seats[3][1].label");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("seats".into()),
                PathSegment::Index(3),
                PathSegment::Index(1),
                PathSegment::Key("label".into()),
            ]
        );
        assert_eq!(path.to_string(), "seats[3][1].label");
    }

    #[test]
    fn test_root_is_empty() {
        assert!(FieldPath::from("").is_root());
        assert_eq!(FieldPath::root().to_string(), "");
    }

    #[test]
    fn test_join_appends_relative_path() {
        let base = FieldPath::from("user");
        assert_eq!(base.join(&FieldPath::from("confirmPassword")).to_string(), "user.confirmPassword");
    }
}
