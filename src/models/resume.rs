use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resume exposed through a shareable link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedResume {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub sections: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_resume_defaults() {
        let resume: SharedResume = serde_json::from_str(r#"{"_id":"r1"}"#).unwrap();
        assert_eq!(resume.id, "r1");
        assert!(resume.sections.is_empty());
    }

    #[test]
    fn test_shared_resume_requires_id() {
        assert!(serde_json::from_str::<SharedResume>(r#"{"title":"CV"}"#).is_err());
    }
}
