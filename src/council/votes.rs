use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::pantheon::RoleProfile;
use super::session::Vote;
use crate::error::{OrchestratorError, Result};
use crate::providers::Backend;

/// Produces one role's vote on a proposal.
#[async_trait]
pub trait VoteCaster: Send + Sync {
    async fn cast(&self, role: &RoleProfile, proposal: &str, purpose: &str) -> Result<Vote>;
}

/// Deterministic heuristic. A role with approval keywords approves exactly
/// when the proposal mentions one of them. Otherwise it approves when the
/// proposal touches its domain, and the lead approves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordVoteCaster;

impl KeywordVoteCaster {
    pub fn evaluate(role: &RoleProfile, proposal: &str) -> Vote {
        let text = proposal.to_lowercase();

        if !role.approves.is_empty() {
            let hits: Vec<&str> = role
                .approves
                .iter()
                .filter(|k| text.contains(k.as_str()))
                .map(String::as_str)
                .collect();
            return if hits.is_empty() {
                Vote::new(
                    false,
                    format!(
                        "As {}, I look for {} and find none of it here",
                        role.title,
                        role.approves.join(" or ")
                    ),
                )
            } else {
                Vote::new(
                    true,
                    format!("As {}, I approve: it speaks to {}", role.title, hits.join(", ")),
                )
            };
        }

        if role.lead {
            return Vote::new(
                true,
                format!("As {}, I support the council taking this up", role.title),
            );
        }

        let domain = role.matched_keywords(&text);
        if domain.is_empty() {
            Vote::new(
                false,
                format!("As {}, I see nothing here within my domain", role.title),
            )
        } else {
            Vote::new(
                true,
                format!("As {}, this advances {}", role.title, domain.join(", ")),
            )
        }
    }
}

#[async_trait]
impl VoteCaster for KeywordVoteCaster {
    async fn cast(&self, role: &RoleProfile, proposal: &str, _purpose: &str) -> Result<Vote> {
        Ok(Self::evaluate(role, proposal))
    }
}

/// Asks the backend for an APPROVE/REJECT verdict.
pub struct BackendVoteCaster {
    backend: Arc<dyn Backend>,
    model: String,
}

impl BackendVoteCaster {
    pub fn new(backend: Arc<dyn Backend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    fn parse(reply: &str) -> Option<Vote> {
        let line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;
        let upper = line.to_ascii_uppercase();
        let (approve, verdict_len) = if upper.starts_with("APPROVE") {
            (true, "APPROVE".len())
        } else if upper.starts_with("REJECT") {
            (false, "REJECT".len())
        } else {
            return None;
        };
        let rationale = line[verdict_len..]
            .trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace())
            .trim();
        Some(Vote::new(approve, rationale))
    }
}

#[async_trait]
impl VoteCaster for BackendVoteCaster {
    async fn cast(&self, role: &RoleProfile, proposal: &str, purpose: &str) -> Result<Vote> {
        let prompt = format!(
            "APPROVE or REJECT the proposal, then give a one-sentence rationale on the same line.\n\n\
             Council purpose: {}\nProposal: {}",
            purpose, proposal
        );
        let system = format!(
            "You are {}, {} of the council. Your domain: {}.",
            role.name,
            role.title,
            role.keywords.join(", ")
        );

        let generation = self
            .backend
            .generate(&self.model, &prompt, &json!({ "system": system }))
            .await?;

        Self::parse(&generation.text).ok_or_else(|| {
            OrchestratorError::Backend(format!(
                "{} returned no verdict: {}",
                role.key,
                generation.text.lines().next().unwrap_or_default()
            ))
        })
    }
}
