use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::types::{AgentId, ArtifactId, DecisionId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Opening,
    Summon,
    Contribution,
    Decision,
    Closing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub index: usize,
    pub speaker: String,
    pub message: String,
    pub kind: EntryKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningEntry {
    pub actor: String,
    pub action: String,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub role: String,
    pub agent_id: Option<AgentId>,
    pub relevance: f64,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub approve: bool,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

impl Vote {
    pub fn new(approve: bool, rationale: impl Into<String>) -> Self {
        Self {
            approve,
            rationale: rationale.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub approvals: usize,
    pub rejections: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Approved,
    Rejected,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Approved => "approved",
            DecisionStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub proposal: String,
    pub votes: BTreeMap<String, Vote>,
    pub tally: Tally,
    pub status: DecisionStatus,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    /// Strict majority: ties and empty vote sets are rejected.
    pub fn tally(proposal: impl Into<String>, votes: BTreeMap<String, Vote>) -> Self {
        let approvals = votes.values().filter(|v| v.approve).count();
        let rejections = votes.len() - approvals;
        let status = if approvals > rejections {
            DecisionStatus::Approved
        } else {
            DecisionStatus::Rejected
        };

        Self {
            id: Uuid::new_v4(),
            proposal: proposal.into(),
            votes,
            tally: Tally {
                approvals,
                rejections,
            },
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == DecisionStatus::Approved
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub purpose: String,
    pub context: Value,
    pub participants: Vec<Participant>,
    pub transcript: Vec<TranscriptEntry>,
    pub decisions: Vec<Decision>,
    pub artifacts: Vec<ArtifactId>,
    pub reasoning_log: Vec<ReasoningEntry>,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}

impl Session {
    pub fn new(purpose: impl Into<String>, context: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            purpose: purpose.into(),
            context,
            participants: Vec::new(),
            transcript: Vec::new(),
            decisions: Vec::new(),
            artifacts: Vec::new(),
            reasoning_log: Vec::new(),
            status: SessionStatus::Active,
            start_time: Utc::now(),
            end_time: None,
            summary: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn participant(&self, role: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.role == role)
    }

    pub fn is_participant(&self, role: &str) -> bool {
        self.participant(role).is_some()
    }

    pub fn participant_keys(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.role.clone()).collect()
    }

    /// Wall-clock time from start to end, or to now while active.
    pub fn duration(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).to_std().unwrap_or_default()
    }

    pub(crate) fn record(
        &mut self,
        speaker: &str,
        message: impl Into<String>,
        kind: EntryKind,
    ) -> &TranscriptEntry {
        let index = self.transcript.len();
        self.transcript.push(TranscriptEntry {
            index,
            speaker: speaker.to_string(),
            message: message.into(),
            kind,
            timestamp: Utc::now(),
        });
        &self.transcript[index]
    }

    pub(crate) fn reason(
        &mut self,
        actor: &str,
        action: &str,
        rationale: impl Into<String>,
    ) {
        self.reasoning_log.push(ReasoningEntry {
            actor: actor.to_string(),
            action: action.to_string(),
            rationale: rationale.into(),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn votes(list: &[(&str, bool)]) -> BTreeMap<String, Vote> {
        list.iter()
            .map(|(role, approve)| (role.to_string(), Vote::new(*approve, "because")))
            .collect()
    }

    #[test]
    fn test_tie_rejects() {
        let decision = Decision::tally("ship it", votes(&[("athena", true), ("apollo", false)]));
        assert_eq!(decision.tally, Tally { approvals: 1, rejections: 1 });
        assert_eq!(decision.status, DecisionStatus::Rejected);
    }

    #[test]
    fn test_empty_vote_rejects() {
        let decision = Decision::tally("ship it", BTreeMap::new());
        assert_eq!(decision.tally, Tally::default());
        assert!(!decision.is_approved());
    }

    #[test]
    fn test_majority_approves() {
        let decision = Decision::tally(
            "ship it",
            votes(&[("athena", true), ("apollo", false), ("zeus", true)]),
        );
        assert!(decision.is_approved());
    }

    #[test]
    fn test_transcript_indices_are_dense() {
        let mut session = Session::new("design the caching layer", json!({}));
        session.record("zeus", "opening", EntryKind::Opening);
        session.record("athena", "joins", EntryKind::Summon);
        let last = session.record("athena", "idea", EntryKind::Contribution).index;

        assert_eq!(last, 2);
        assert!(session
            .transcript
            .iter()
            .enumerate()
            .all(|(i, entry)| entry.index == i));
    }
}
