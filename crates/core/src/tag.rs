//! Tag categories and the remote tag record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag category as reported by the remote catalog.
///
/// The catalog encodes categories as small integers with gaps; anything
/// unrecognised maps to [`TagType::Other`]. The raw code is what gets stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagType {
    General,
    Artist,
    Copyright,
    Character,
    Company,
    Other,
}

impl TagType {
    pub fn from_code(code: i16) -> Self {
        match code {
            0 => Self::General,
            1 => Self::Artist,
            3 => Self::Copyright,
            4 => Self::Character,
            6 => Self::Company,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "GENERAL",
            Self::Artist => "ARTIST",
            Self::Copyright => "COPYRIGHT",
            Self::Character => "CHARACTER",
            Self::Company => "COMPANY",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the remote tag dump.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTag {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub count: i64,
    #[serde(rename = "type", default)]
    pub tag_type: i16,
    #[serde(default)]
    pub ambiguous: bool,
}

impl RemoteTag {
    pub fn category(&self) -> TagType {
        TagType::from_code(self.tag_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_type_codes() {
        assert_eq!(TagType::from_code(0), TagType::General);
        assert_eq!(TagType::from_code(1), TagType::Artist);
        assert_eq!(TagType::from_code(2), TagType::Other);
        assert_eq!(TagType::from_code(3), TagType::Copyright);
        assert_eq!(TagType::from_code(4), TagType::Character);
        assert_eq!(TagType::from_code(5), TagType::Other);
        assert_eq!(TagType::from_code(6), TagType::Company);
        assert_eq!(TagType::Company.to_string(), "COMPANY");
    }

    #[test]
    fn test_remote_tag_deserialize() {
        let json = r#"{"id": 12, "name": "landscape", "count": 9001, "type": 0, "ambiguous": false}"#;
        let tag: RemoteTag = serde_json::from_str(json).unwrap();
        assert_eq!(tag.id, 12);
        assert_eq!(tag.name, "landscape");
        assert_eq!(tag.count, 9001);
        assert_eq!(tag.category(), TagType::General);
    }

    #[test]
    fn test_remote_tag_missing_optional_fields() {
        let tag: RemoteTag = serde_json::from_str(r#"{"id": 3, "name": "x"}"#).unwrap();
        assert_eq!(tag.count, 0);
        assert_eq!(tag.tag_type, 0);
        assert!(!tag.ambiguous);
    }
}
