use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

/// Catalog key of a course (e.g. "EE250").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseCode(pub String);

impl CourseCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CourseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CourseCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

impl Borrow<str> for CourseCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Unique identifier of a student.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub String);

impl StudentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StudentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for StudentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_course_code_display() {
        assert_eq!(CourseCode::new("EE250").to_string(), "EE250");
    }

    #[test]
    fn test_lookup_by_str() {
        let mut counts: HashMap<CourseCode, u32> = HashMap::new();
        counts.insert("EE250".into(), 3);
        assert_eq!(counts.get("EE250"), Some(&3));
    }

    #[test]
    fn test_transparent_serde() {
        let id = StudentId::new("2433632");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"2433632\"");
        let back: StudentId = serde_json::from_str("\"2433632\"").unwrap();
        assert_eq!(back, id);
    }
}
