pub mod artifacts;
pub mod pantheon;
pub mod session;
pub mod votes;

pub use artifacts::{Artifact, ArtifactStore};
pub use pantheon::{default_pantheon, RoleProfile};
pub use session::{
    Decision, DecisionStatus, EntryKind, Participant, ReasoningEntry, Session, SessionStatus,
    Tally, TranscriptEntry, Vote,
};
pub use votes::{BackendVoteCaster, KeywordVoteCaster, VoteCaster};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::Mutex as AsyncMutex;

use crate::agent::Agent;
use crate::config::CouncilConfig;
use crate::error::{OrchestratorError, Result};
use crate::events::DomainEvent;
use crate::registry::{AgentOverrides, Registry};
use crate::types::{AgentId, ArtifactDraft, SessionId, Task, TaskOutput};

const COUNCIL_SPEAKER: &str = "council";

/// What a role adds to a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contribution {
    pub message: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub artifact: Option<ArtifactDraft>,
}

impl Contribution {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactDraft) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CouncilStatistics {
    pub total_sessions: u64,
    pub active_sessions: usize,
    pub completed_sessions: usize,
    pub roles_summoned: u64,
    pub contributions: u64,
    pub artifacts_created: u64,
    pub decisions_reached: u64,
    pub decisions_approved: u64,
    pub average_session_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub role: String,
    pub name: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub agent_id: Option<AgentId>,
    pub relevance: f64,
}

/// Self-contained record of a session for archiving or rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    pub title: String,
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub summary: Option<String>,
    pub participants: Vec<ParticipantRecord>,
    pub transcript: Vec<TranscriptEntry>,
    pub decisions: Vec<Decision>,
    pub artifacts: Vec<Artifact>,
    pub reasoning_log: Vec<ReasoningEntry>,
}

impl SessionDocument {
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n", self.title);
        out.push_str(&format!("- Session: `{}`\n", self.session_id));
        out.push_str(&format!("- Started: {}\n", self.started_at.to_rfc3339()));
        if let Some(ended) = self.ended_at {
            out.push_str(&format!("- Ended: {}\n", ended.to_rfc3339()));
        }
        out.push_str(&format!("- Duration: {} ms\n\n", self.duration_ms));

        out.push_str("## Participants\n\n");
        for p in &self.participants {
            out.push_str(&format!(
                "- **{}** ({}), relevance {:.2}\n",
                p.name, p.title, p.relevance
            ));
        }

        out.push_str("\n## Transcript\n\n");
        for entry in &self.transcript {
            out.push_str(&format!(
                "{}. [{:?}] **{}**: {}\n",
                entry.index + 1,
                entry.kind,
                entry.speaker,
                entry.message
            ));
        }

        if !self.decisions.is_empty() {
            out.push_str("\n## Decisions\n\n");
            for decision in &self.decisions {
                out.push_str(&format!(
                    "- {}: **{}** ({} for, {} against)\n",
                    decision.proposal,
                    decision.status.as_str(),
                    decision.tally.approvals,
                    decision.tally.rejections
                ));
            }
        }

        if !self.artifacts.is_empty() {
            out.push_str("\n## Artifacts\n\n");
            for artifact in &self.artifacts {
                out.push_str(&format!(
                    "- `{}` {} by {}\n",
                    artifact.id, artifact.artifact_type, artifact.creator
                ));
            }
        }

        if let Some(summary) = &self.summary {
            out.push_str("\n## Summary\n\n");
            out.push_str(summary);
            out.push('\n');
        }
        out
    }
}

#[derive(Default)]
struct Counters {
    total_sessions: u64,
    roles_summoned: u64,
    contributions: u64,
    artifacts_created: u64,
    decisions_reached: u64,
    decisions_approved: u64,
    completed: u64,
    average_duration_ms: f64,
}

/// Purpose-scoped collaboration among registry agents. Each active session
/// sits behind its own async mutex, so operations on one session apply in
/// order and the transcript stays gap-free.
pub struct Council {
    registry: Registry,
    config: CouncilConfig,
    roles: Vec<RoleProfile>,
    caster: Arc<dyn VoteCaster>,
    active: RwLock<HashMap<SessionId, Arc<AsyncMutex<Session>>>>,
    completed: RwLock<HashMap<SessionId, Arc<Session>>>,
    artifacts: ArtifactStore,
    counters: Mutex<Counters>,
}

impl Council {
    pub fn new(registry: Registry, config: CouncilConfig) -> Self {
        Self {
            registry,
            config,
            roles: default_pantheon(),
            caster: Arc::new(KeywordVoteCaster),
            active: RwLock::new(HashMap::new()),
            completed: RwLock::new(HashMap::new()),
            artifacts: ArtifactStore::new(),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn with_roles(mut self, roles: Vec<RoleProfile>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_vote_caster(mut self, caster: Arc<dyn VoteCaster>) -> Self {
        self.caster = caster;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn roles(&self) -> &[RoleProfile] {
        &self.roles
    }

    pub fn role(&self, key: &str) -> Option<&RoleProfile> {
        self.roles.iter().find(|r| r.key == key)
    }

    fn profile(&self, key: &str) -> Result<&RoleProfile> {
        self.role(key)
            .ok_or_else(|| OrchestratorError::UnknownRole(key.to_string()))
    }

    fn lead(&self) -> Option<&RoleProfile> {
        self.roles.iter().find(|r| r.lead)
    }

    fn speaker(&self) -> &str {
        self.lead().map_or(COUNCIL_SPEAKER, |r| r.key.as_str())
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, id: SessionId) -> Result<Arc<AsyncMutex<Session>>> {
        if let Some(handle) = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return Ok(handle.clone());
        }
        if self.is_completed(id) {
            return Err(OrchestratorError::InvalidState(format!(
                "session {} has ended",
                id
            )));
        }
        Err(OrchestratorError::SessionNotFound(id))
    }

    fn is_completed(&self, id: SessionId) -> bool {
        self.completed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Roles to seat at the start: the lead, then every role whose keywords
    /// overlap the purpose, highest relevance first.
    fn select_roles(&self, purpose: &str) -> Vec<&RoleProfile> {
        let mut scored: Vec<(&RoleProfile, f64)> = self
            .roles
            .iter()
            .filter(|r| !r.lead)
            .map(|r| (r, r.relevance(purpose)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        self.lead()
            .into_iter()
            .chain(scored.into_iter().map(|(r, _)| r))
            .take(self.config.max_participants)
            .collect()
    }

    pub async fn start(&self, purpose: &str, context: Value) -> Result<Session> {
        let snapshot = {
            let session = Session::new(purpose, context);
            let id = session.id;
            let handle = Arc::new(AsyncMutex::new(session));
            let mut session = handle.clone().lock_owned().await;
            self.active
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, handle);
            self.counters().total_sessions += 1;
            self.registry.events().publish(DomainEvent::CouncilStarted {
                session_id: id,
                purpose: purpose.to_string(),
            });

            let speaker = self.speaker().to_string();
            session.record(
                &speaker,
                format!("The council convenes. Purpose: {}", purpose),
                EntryKind::Opening,
            );
            for profile in self.select_roles(purpose) {
                if let Err(e) = self.admit(&mut session, profile) {
                    self.active
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id);
                    return Err(e);
                }
            }
            session.clone()
        };

        log::info!(
            "Council session {} started for '{}' with {:?}",
            snapshot.id,
            purpose,
            snapshot.participant_keys()
        );
        Ok(snapshot)
    }

    /// Adds `role` to the session. Summoning a present role returns the
    /// existing record without touching the transcript.
    pub async fn summon(&self, session_id: SessionId, role: &str) -> Result<Participant> {
        let profile = self.profile(role)?;
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;
        ensure_active(&session)?;
        self.admit(&mut session, profile)
    }

    fn admit(&self, session: &mut Session, profile: &RoleProfile) -> Result<Participant> {
        if let Some(existing) = session.participant(&profile.key) {
            return Ok(existing.clone());
        }
        if session.participants.len() >= self.config.max_participants {
            return Err(OrchestratorError::CapacityExceeded(format!(
                "session {} already seats {} roles",
                session.id, self.config.max_participants
            )));
        }

        let agent_id = self.bind(profile).map(|agent| agent.id());
        let matched = profile.matched_keywords(&session.purpose);
        let participant = Participant {
            role: profile.key.clone(),
            agent_id,
            relevance: profile.relevance(&session.purpose),
            joined_at: Utc::now(),
        };

        session.participants.push(participant.clone());
        session.record(
            &profile.key,
            format!("{}, {}, joins the council", profile.name, profile.title),
            EntryKind::Summon,
        );
        if self.config.transparent_reasoning {
            let rationale = if profile.lead {
                "leads every session".to_string()
            } else if matched.is_empty() {
                "no keyword overlap with the purpose; summoned on request".to_string()
            } else {
                format!("keyword overlap with the purpose: {}", matched.join(", "))
            };
            let speaker = self.speaker().to_string();
            session.reason(&speaker, &format!("summon {}", profile.key), rationale);
        }

        self.counters().roles_summoned += 1;
        log::debug!(
            "Session {}: summoned {} (agent {:?})",
            session.id,
            profile.key,
            participant.agent_id
        );
        self.registry.events().publish(DomainEvent::RoleSummoned {
            session_id: session.id,
            role: profile.key.clone(),
        });

        Ok(participant)
    }

    /// Live registry agent for a role: an existing agent of its type, or a
    /// newly created one. Binding failures leave the role without an agent.
    fn bind(&self, profile: &RoleProfile) -> Option<Arc<Agent>> {
        let agent_type = profile.agent_type.as_deref()?;
        if let Some(agent) = self.registry.get_agent_by_name(agent_type) {
            return Some(agent);
        }
        match self
            .registry
            .create_agent(agent_type, AgentOverrides::default())
        {
            Ok(agent) => Some(agent),
            Err(e) => {
                log::warn!(
                    "Role {} has no '{}' agent: {}",
                    profile.key,
                    agent_type,
                    e
                );
                None
            }
        }
    }

    pub async fn contribute(
        &self,
        session_id: SessionId,
        role: &str,
        contribution: Contribution,
    ) -> Result<TranscriptEntry> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;
        ensure_active(&session)?;
        ensure_participant(&session, role)?;
        Ok(self.record_contribution(&mut session, role, contribution))
    }

    fn record_contribution(
        &self,
        session: &mut Session,
        role: &str,
        contribution: Contribution,
    ) -> TranscriptEntry {
        if let Some(draft) = contribution.artifact {
            if self.config.enable_artifacts {
                let artifact = self
                    .artifacts
                    .insert(Artifact::from_draft(session.id, role, draft));
                session.artifacts.push(artifact.id);
                self.counters().artifacts_created += 1;
                self.registry.events().publish(DomainEvent::ArtifactCreated {
                    session_id: session.id,
                    artifact_id: artifact.id,
                    creator: role.to_string(),
                });
            } else {
                log::debug!("Artifacts disabled; dropping draft from {}", role);
            }
        }

        if self.config.transparent_reasoning {
            if let Some(reasoning) = contribution.reasoning {
                session.reason(role, "contribute", reasoning);
            }
        }
        let entry = session
            .record(role, contribution.message, EntryKind::Contribution)
            .clone();

        self.counters().contributions += 1;
        self.registry.events().publish(DomainEvent::RoleContribution {
            session_id: session.id,
            role: role.to_string(),
        });
        entry
    }

    /// Runs `task` on the role's agent and records the output as the role's
    /// contribution. The session stays unlocked while the agent works.
    pub async fn assign_task(
        &self,
        session_id: SessionId,
        role: &str,
        task: Task,
    ) -> Result<TaskOutput> {
        let profile = self.profile(role)?;
        let handle = self.handle(session_id)?;

        let agent = {
            let mut session = handle.lock().await;
            ensure_active(&session)?;
            ensure_participant(&session, role)?;

            let bound = session
                .participant(role)
                .and_then(|p| p.agent_id)
                .and_then(|id| self.registry.get_agent(id));
            match bound {
                Some(agent) => agent,
                None => {
                    let agent = self.bind(profile).ok_or_else(|| {
                        OrchestratorError::InvalidState(format!(
                            "role '{}' has no agent to run tasks",
                            role
                        ))
                    })?;
                    if let Some(p) = session.participants.iter_mut().find(|p| p.role == role) {
                        p.agent_id = Some(agent.id());
                    }
                    agent
                }
            }
        };

        let task_type = task.task_type.clone();
        let output = agent.execute(task.with_requestor(role)).await?;

        let mut contribution = Contribution::new(format!(
            "Completed {}: {}",
            task_type,
            render(&output.content)
        ));
        if let Some(draft) = output.artifact.clone() {
            contribution = contribution.with_artifact(draft);
        }
        if let Some(refinement) = &output.refinement {
            contribution = contribution.with_reasoning(format!(
                "refined after validation: {}",
                refinement.feedback.join("; ")
            ));
        }

        let mut session = handle.lock().await;
        ensure_active(&session)?;
        self.record_contribution(&mut session, role, contribution);
        Ok(output)
    }

    /// Collects a vote from each voter (all participants by default) and
    /// appends the decision. Nothing is recorded if any voter is invalid or
    /// any vote cannot be cast.
    pub async fn vote(
        &self,
        session_id: SessionId,
        proposal: &str,
        voters: Option<Vec<String>>,
    ) -> Result<Decision> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;
        ensure_active(&session)?;

        let voters = voters.unwrap_or_else(|| session.participant_keys());
        let mut profiles = Vec::with_capacity(voters.len());
        for key in &voters {
            let profile = self.profile(key)?;
            ensure_participant(&session, key)?;
            profiles.push(profile);
        }

        let purpose = session.purpose.clone();
        let cast = join_all(
            profiles
                .iter()
                .map(|profile| self.caster.cast(profile, proposal, &purpose)),
        )
        .await;

        let mut votes = BTreeMap::new();
        for (profile, vote) in profiles.iter().zip(cast) {
            votes.insert(profile.key.clone(), vote?);
        }
        let decision = Decision::tally(proposal, votes);

        if self.config.transparent_reasoning {
            for (role, vote) in &decision.votes {
                let action = if vote.approve { "approve" } else { "reject" };
                session.reason(role, action, vote.rationale.clone());
            }
        }
        let speaker = self.speaker().to_string();
        session.record(
            &speaker,
            format!(
                "Decision on \"{}\": {} ({} approvals, {} rejections)",
                proposal,
                decision.status.as_str().to_uppercase(),
                decision.tally.approvals,
                decision.tally.rejections
            ),
            EntryKind::Decision,
        );
        session.decisions.push(decision.clone());

        {
            let mut counters = self.counters();
            counters.decisions_reached += 1;
            if decision.is_approved() {
                counters.decisions_approved += 1;
            }
        }
        log::info!(
            "Session {}: '{}' {}",
            session.id,
            proposal,
            decision.status.as_str()
        );
        self.registry.events().publish(DomainEvent::DecisionReached {
            session_id: session.id,
            decision_id: decision.id,
            approved: decision.is_approved(),
        });

        Ok(decision)
    }

    /// Closes the session and moves it to the completed store. A session can
    /// be ended once.
    pub async fn end(&self, session_id: SessionId, summary: Option<String>) -> Result<Session> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;
        ensure_active(&session)?;

        session.status = SessionStatus::Completed;
        session.end_time = Some(Utc::now());
        let summary = summary.unwrap_or_else(|| self.summarize(&session));
        session.summary = Some(summary.clone());
        let speaker = self.speaker().to_string();
        session.record(&speaker, summary, EntryKind::Closing);

        let duration = session.duration();
        let archived = Arc::new(session.clone());
        drop(session);

        // archive before leaving `active`; lookups must always find the session
        self.completed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, archived.clone());
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session_id);

        {
            let mut counters = self.counters();
            counters.completed += 1;
            let ms = duration.as_secs_f64() * 1000.0;
            counters.average_duration_ms +=
                (ms - counters.average_duration_ms) / counters.completed as f64;
        }
        self.registry.record_session_duration(duration);

        log::info!("Council session {} ended after {:?}", session_id, duration);
        self.registry.events().publish(DomainEvent::CouncilEnded {
            session_id,
            duration_ms: duration.as_millis() as u64,
        });

        Ok((*archived).clone())
    }

    fn summarize(&self, session: &Session) -> String {
        let names: Vec<&str> = session
            .participants
            .iter()
            .map(|p| self.role(&p.role).map_or(p.role.as_str(), |r| r.name.as_str()))
            .collect();
        let approved = session.decisions.iter().filter(|d| d.is_approved()).count();

        format!(
            "Purpose: {}. Participants: {}. Decisions: {} ({} approved). Artifacts: {}. Duration: {} ms.",
            session.purpose,
            names.join(", "),
            session.decisions.len(),
            approved,
            session.artifacts.len(),
            session.duration().as_millis()
        )
    }

    /// Snapshot of an active or completed session.
    pub async fn session(&self, session_id: SessionId) -> Result<Session> {
        let active = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .cloned();
        if let Some(handle) = active {
            return Ok(handle.lock().await.clone());
        }
        self.completed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .map(|s| (**s).clone())
            .ok_or(OrchestratorError::SessionNotFound(session_id))
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    pub fn artifacts_for(&self, session_id: SessionId) -> Vec<Arc<Artifact>> {
        self.artifacts.for_session(session_id)
    }

    pub fn artifact(&self, id: crate::types::ArtifactId) -> Option<Arc<Artifact>> {
        self.artifacts.get(id)
    }

    pub fn statistics(&self) -> CouncilStatistics {
        let active_sessions = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let completed_sessions = self
            .completed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let counters = self.counters();

        CouncilStatistics {
            total_sessions: counters.total_sessions,
            active_sessions,
            completed_sessions,
            roles_summoned: counters.roles_summoned,
            contributions: counters.contributions,
            artifacts_created: counters.artifacts_created,
            decisions_reached: counters.decisions_reached,
            decisions_approved: counters.decisions_approved,
            average_session_duration_ms: counters.average_duration_ms,
        }
    }

    pub async fn documentation(&self, session_id: SessionId) -> Result<SessionDocument> {
        let session = self.session(session_id).await?;

        let participants = session
            .participants
            .iter()
            .map(|p| {
                let profile = self.role(&p.role);
                ParticipantRecord {
                    role: p.role.clone(),
                    name: profile.map_or_else(|| p.role.clone(), |r| r.name.clone()),
                    title: profile.map(|r| r.title.clone()).unwrap_or_default(),
                    keywords: profile.map(|r| r.keywords.clone()).unwrap_or_default(),
                    agent_id: p.agent_id,
                    relevance: p.relevance,
                }
            })
            .collect();

        let artifacts = session
            .artifacts
            .iter()
            .filter_map(|id| self.artifacts.get(*id))
            .map(|a| (*a).clone())
            .collect();

        Ok(SessionDocument {
            title: format!("Council session: {}", session.purpose),
            session_id: session.id,
            status: session.status,
            started_at: session.start_time,
            ended_at: session.end_time,
            duration_ms: session.duration().as_millis() as u64,
            summary: session.summary.clone(),
            participants,
            transcript: session.transcript,
            decisions: session.decisions,
            artifacts,
            reasoning_log: session.reasoning_log,
        })
    }
}

fn ensure_active(session: &Session) -> Result<()> {
    if session.is_active() {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidState(format!(
            "session {} has ended",
            session.id
        )))
    }
}

fn ensure_participant(session: &Session, role: &str) -> Result<()> {
    if session.is_participant(role) {
        Ok(())
    } else {
        Err(OrchestratorError::NotParticipant {
            role: role.to_string(),
            session: session.id,
        })
    }
}

fn render(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
