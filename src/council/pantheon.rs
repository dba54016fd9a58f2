use serde::{Deserialize, Serialize};

const KEYWORD_WEIGHT: f64 = 0.25;

/// A seat at the council: the domain keywords used for relevance scoring,
/// the keywords the role approves of when voting, and the registry agent
/// type that does its work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleProfile {
    pub key: String,
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub approves: Vec<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub lead: bool,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_ascii_lowercase()).collect()
}

impl RoleProfile {
    pub fn new(key: impl Into<String>, name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            title: title.into(),
            keywords: Vec::new(),
            approves: Vec::new(),
            agent_type: None,
            lead: false,
        }
    }

    /// The role that opens every session and is always summoned first.
    pub fn orchestrator(
        key: impl Into<String>,
        name: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            lead: true,
            ..Self::new(key, name, title)
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = owned(keywords);
        self
    }

    pub fn with_approvals(mut self, approves: &[&str]) -> Self {
        self.approves = owned(approves);
        self
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    /// Domain keywords occurring in `text` (case-insensitive substring match).
    pub fn matched_keywords(&self, text: &str) -> Vec<&str> {
        let text = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// 0.25 per matched keyword, capped at 1.0.
    pub fn relevance(&self, purpose: &str) -> f64 {
        (self.matched_keywords(purpose).len() as f64 * KEYWORD_WEIGHT).min(1.0)
    }
}

pub fn default_pantheon() -> Vec<RoleProfile> {
    vec![
        RoleProfile::orchestrator("zeus", "Zeus", "King of the Council")
            .with_keywords(&["coordinate", "decide", "lead", "resolve"]),
        RoleProfile::new("athena", "Athena", "Strategist")
            .with_keywords(&["plan", "architect", "design", "strategy"])
            .with_approvals(&["plan", "strategy"])
            .with_agent_type("architect"),
        RoleProfile::new("apollo", "Apollo", "Guardian of Quality")
            .with_keywords(&["test", "quality", "verify", "validate"])
            .with_approvals(&["quality", "test"])
            .with_agent_type("advisor"),
        RoleProfile::new("hephaestus", "Hephaestus", "Master Builder")
            .with_keywords(&["build", "implement", "create", "develop"])
            .with_approvals(&["build", "implement"])
            .with_agent_type("builder"),
        RoleProfile::new("hermes", "Hermes", "Integrator")
            .with_keywords(&["integrate", "api", "connect", "communicate"]),
        RoleProfile::new("prometheus", "Prometheus", "Innovator")
            .with_keywords(&["innovat", "research", "new", "breakthrough"])
            .with_approvals(&["new", "innovate"]),
        RoleProfile::new("artemis", "Artemis", "Tracker")
            .with_keywords(&["debug", "track", "monitor", "issue"]),
    ]
}
