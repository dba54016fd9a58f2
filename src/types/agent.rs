use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Initialized, // Constructed, not yet accepting work
    Ready,       // Idle, accepts tasks
    Executing,   // Running exactly one task
    Paused,      // Rejects work until resumed
    Error,       // Last attempt failed, awaiting classification
    Terminated,  // Gone
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Initialized => "initialized",
            AgentState::Ready => "ready",
            AgentState::Executing => "executing",
            AgentState::Paused => "paused",
            AgentState::Error => "error",
            AgentState::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Creator,
    Advisor,
    Designer,
    Manager,
    Specialist,
    Validator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Creator => "creator",
            Role::Advisor => "advisor",
            Role::Designer => "designer",
            Role::Manager => "manager",
            Role::Specialist => "specialist",
            Role::Validator => "validator",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "creator" => Some(Role::Creator),
            "advisor" => Some(Role::Advisor),
            "designer" => Some(Role::Designer),
            "manager" => Some(Role::Manager),
            "specialist" => Some(Role::Specialist),
            "validator" => Some(Role::Validator),
            _ => None,
        }
    }

    /// Advisors and validators review work; they never produce or change it.
    pub fn is_validator_class(&self) -> bool {
        matches!(self, Role::Advisor | Role::Validator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Allowed,
    Forbidden,
}

impl Permission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Permission::Allowed)
    }
}

impl Default for Permission {
    fn default() -> Self {
        Permission::Allowed
    }
}

/// Model families that only ever act as reviewers.
const READ_ONLY_MODEL_PREFIXES: &[&str] = &["gemini"];

pub fn is_read_only_model(model: &str) -> bool {
    let model = model.to_ascii_lowercase();
    READ_ONLY_MODEL_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

/// Three independent permission flags. Fields are private so a set attached
/// to an agent cannot be widened after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    #[serde(default)]
    content_generation: Permission,
    #[serde(default)]
    file_modification: Permission,
    #[serde(default)]
    command_execution: Permission,
}

impl CapabilitySet {
    pub fn new(
        content_generation: Permission,
        file_modification: Permission,
        command_execution: Permission,
    ) -> Self {
        Self {
            content_generation,
            file_modification,
            command_execution,
        }
    }

    pub fn all_allowed() -> Self {
        Self::new(Permission::Allowed, Permission::Allowed, Permission::Allowed)
    }

    pub fn read_only() -> Self {
        Self::new(
            Permission::Forbidden,
            Permission::Forbidden,
            Permission::Forbidden,
        )
    }

    /// Resolves the set an agent actually receives: validator-class roles and
    /// read-only model families are forced to all-forbidden regardless of
    /// what was requested.
    pub fn for_agent(requested: CapabilitySet, role: Role, model: &str) -> Self {
        if role.is_validator_class() || is_read_only_model(model) {
            Self::read_only()
        } else {
            requested
        }
    }

    pub fn content_generation(&self) -> Permission {
        self.content_generation
    }

    pub fn file_modification(&self) -> Permission {
        self.file_modification
    }

    pub fn command_execution(&self) -> Permission {
        self.command_execution
    }

    pub fn is_read_only(&self) -> bool {
        !self.content_generation.is_allowed()
            && !self.file_modification.is_allowed()
            && !self.command_execution.is_allowed()
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::all_allowed()
    }
}
