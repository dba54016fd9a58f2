use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::TaskId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: String,
    pub payload: Value,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub requestor: Option<String>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: TaskId::new_v4(),
            task_type: task_type.into(),
            payload,
            retry_count: 0,
            requestor: None,
        }
    }

    pub fn with_requestor(mut self, requestor: impl Into<String>) -> Self {
        self.requestor = Some(requestor.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub content: Value,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub artifact: Option<ArtifactDraft>,
    #[serde(default)]
    pub refinement: Option<Refinement>,
}

impl TaskOutput {
    pub fn new(content: Value) -> Self {
        Self {
            content,
            tokens_used: None,
            artifact: None,
            refinement: None,
        }
    }

    pub fn with_tokens(mut self, tokens: Option<u64>) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactDraft) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

/// An artifact proposed by a task, stored once a council accepts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDraft {
    pub artifact_type: String,
    pub content: Value,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refinement {
    pub feedback: Vec<String>,
    pub refined_at: DateTime<Utc>,
}

/// A single finding reported by a reviewer. Severity is on a 0-10 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: String,
    #[serde(deserialize_with = "clamped_severity")]
    pub severity: u8,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
}

fn clamped_severity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = u64::deserialize(deserializer)?;
    Ok(raw.min(10) as u8)
}

impl Issue {
    pub fn new(kind: impl Into<String>, severity: u8, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            severity: severity.min(10),
            description: description.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_severity_clamped() {
        assert_eq!(Issue::new("security", 42, "leak").severity, 10);

        let issue: Issue = serde_json::from_value(json!({
            "kind": "security",
            "severity": 200,
            "description": "hard-coded credential"
        }))
        .unwrap();
        assert_eq!(issue.severity, 10);
        assert!(issue.location.is_none());

        let issue: Issue = serde_json::from_value(json!({
            "kind": "quality",
            "severity": 70000,
            "description": "unchecked unwrap",
            "location": "line 3"
        }))
        .unwrap();
        assert_eq!(issue.severity, 10);
        assert_eq!(issue.location.as_deref(), Some("line 3"));

        let issue: Issue =
            serde_json::from_value(json!({"kind": "style", "severity": 4, "description": "x"}))
                .unwrap();
        assert_eq!(issue.severity, 4);
    }
}
