use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::types::{ArtifactDraft, ArtifactId, SessionId};

/// Output a role produced during a session. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub session_id: SessionId,
    pub creator: String,
    pub artifact_type: String,
    pub content: Value,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

impl Artifact {
    pub fn from_draft(session_id: SessionId, creator: &str, draft: ArtifactDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            creator: creator.to_string(),
            artifact_type: draft.artifact_type,
            content: draft.content,
            metadata: draft.metadata,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Default)]
struct Inner {
    artifacts: HashMap<ArtifactId, Arc<Artifact>>,
    by_session: HashMap<SessionId, Vec<ArtifactId>>,
}

#[derive(Default)]
pub struct ArtifactStore {
    inner: RwLock<Inner>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, artifact: Artifact) -> Arc<Artifact> {
        let artifact = Arc::new(artifact);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_session
            .entry(artifact.session_id)
            .or_default()
            .push(artifact.id);
        inner.artifacts.insert(artifact.id, artifact.clone());
        artifact
    }

    pub fn get(&self, id: ArtifactId) -> Option<Arc<Artifact>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.artifacts.get(&id).cloned()
    }

    /// Artifacts of one session in creation order.
    pub fn for_session(&self, session_id: SessionId) -> Vec<Arc<Artifact>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_session
            .get(&session_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.artifacts.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .artifacts
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
