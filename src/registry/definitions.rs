use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::builtin::{
    ArchitectHandler, BuilderHandler, DocumenterHandler, PromptHandler, ReviewHandler,
};
use crate::agent::{AgentSpec, TaskHandler};
use crate::error::{OrchestratorError, Result};
use crate::lifecycle::RetryPolicy;
use crate::tools::ToolKind;
use crate::types::{CapabilitySet, Permission, Role};

/// Produces the spec and handler for one registered agent type.
pub trait AgentFactory: Send + Sync {
    fn blueprint(&self) -> AgentSpec;
    fn handler(&self) -> Arc<dyn TaskHandler>;
}

/// Code-defined agent type: a fixed spec plus a shared handler.
pub struct AgentTemplate {
    spec: AgentSpec,
    handler: Arc<dyn TaskHandler>,
}

impl AgentTemplate {
    pub fn new(spec: AgentSpec, handler: Arc<dyn TaskHandler>) -> Self {
        Self { spec, handler }
    }
}

impl AgentFactory for AgentTemplate {
    fn blueprint(&self) -> AgentSpec {
        self.spec.clone()
    }

    fn handler(&self) -> Arc<dyn TaskHandler> {
        self.handler.clone()
    }
}

/// Agent type loaded from YAML.
///
/// ```yaml
/// name: security-reviewer
/// description: Reviews changes for security problems
/// model: claude-3-5-sonnet-20240620
/// role: specialist
/// specialization: security
/// tools: [read, grep, glob]
/// task_types: [audit_dependencies, review_auth]
/// system_prompt: You are a security engineer.
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    #[serde(flatten)]
    pub spec: AgentSpec,
    #[serde(default)]
    pub task_types: Vec<String>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub artifact_type: Option<String>,
}

impl AgentDefinition {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let definition: AgentDefinition = serde_yaml::from_str(raw)
            .map_err(|e| OrchestratorError::Configuration(format!("invalid definition: {}", e)))?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn validate(&self) -> Result<()> {
        self.spec.validate()?;
        if !self.spec.role.is_validator_class() && self.task_types.is_empty() {
            return Err(OrchestratorError::Configuration(format!(
                "definition '{}' must list at least one task type",
                self.spec.name
            )));
        }
        Ok(())
    }
}

impl AgentFactory for AgentDefinition {
    fn blueprint(&self) -> AgentSpec {
        self.spec.clone()
    }

    fn handler(&self) -> Arc<dyn TaskHandler> {
        if self.spec.role.is_validator_class() {
            return Arc::new(ReviewHandler);
        }
        let system_prompt = if self.system_prompt.trim().is_empty() {
            self.spec.description.clone()
        } else {
            self.system_prompt.clone()
        };
        Arc::new(
            PromptHandler::new(self.task_types.clone(), system_prompt)
                .with_artifact_type(self.artifact_type.clone()),
        )
    }
}

/// Loads every `*.yaml`/`*.yml` file in `dir`, sorted by file name.
pub fn load_definitions(dir: &Path) -> Result<Vec<AgentDefinition>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        OrchestratorError::Configuration(format!("cannot read {}: {}", dir.display(), e))
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    paths.sort();

    let mut definitions = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            OrchestratorError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let definition = AgentDefinition::from_yaml(&raw).map_err(|e| {
            OrchestratorError::Configuration(format!("{}: {}", path.display(), e))
        })?;
        log::debug!(
            "Loaded agent definition '{}' from {}",
            definition.spec.name,
            path.display()
        );
        definitions.push(definition);
    }
    Ok(definitions)
}

const OPUS: &str = "claude-3-opus-20240229";
const SONNET: &str = "claude-3-5-sonnet-20240620";
const HAIKU: &str = "claude-3-haiku-20240307";
const GEMINI_PRO: &str = "gemini-1.5-pro";

fn no_commands() -> CapabilitySet {
    CapabilitySet::new(Permission::Allowed, Permission::Allowed, Permission::Forbidden)
}

/// Agent types available without any definition files.
pub fn builtin_types() -> Vec<(&'static str, Arc<dyn AgentFactory>)> {
    let architect = AgentSpec::new(
        "architect",
        "Designs systems, components and APIs",
        OPUS,
        Role::Designer,
    )
    .with_specialization("architecture")
    .with_capabilities(no_commands())
    .with_tools(vec![ToolKind::Read, ToolKind::Write, ToolKind::Grep, ToolKind::Glob])
    .with_timeout(Duration::from_secs(120));

    let builder = AgentSpec::new(
        "builder",
        "Implements features, fixes bugs and writes tests",
        SONNET,
        Role::Creator,
    )
    .with_specialization("implementation")
    .with_capabilities(CapabilitySet::all_allowed())
    .with_tools(ToolKind::all())
    .with_timeout(Duration::from_secs(300));

    let documenter = AgentSpec::new(
        "documenter",
        "Writes READMEs, guides and API documentation",
        HAIKU,
        Role::Specialist,
    )
    .with_specialization("documentation")
    .with_capabilities(no_commands())
    .with_tools(vec![
        ToolKind::Read,
        ToolKind::Write,
        ToolKind::Edit,
        ToolKind::Grep,
        ToolKind::Glob,
    ])
    .with_timeout(Duration::from_secs(120));

    let advisor = AgentSpec::new(
        "advisor",
        "Reviews work and suggests improvements without modifying anything",
        GEMINI_PRO,
        Role::Advisor,
    )
    .with_specialization("review")
    .with_capabilities(CapabilitySet::read_only())
    .with_tools(ToolKind::read_only())
    .with_retry_policy(RetryPolicy {
        max_retries: 2,
        ..RetryPolicy::default()
    })
    .with_timeout(Duration::from_secs(60));

    let validator = AgentSpec::new(
        "validator",
        "Checks outputs against quality and security thresholds",
        SONNET,
        Role::Validator,
    )
    .with_specialization("validation")
    .with_capabilities(CapabilitySet::read_only())
    .with_tools(ToolKind::read_only())
    .with_timeout(Duration::from_secs(60));

    vec![
        (
            "architect",
            Arc::new(AgentTemplate::new(architect, Arc::new(ArchitectHandler))),
        ),
        (
            "builder",
            Arc::new(AgentTemplate::new(builder, Arc::new(BuilderHandler))),
        ),
        (
            "documenter",
            Arc::new(AgentTemplate::new(documenter, Arc::new(DocumenterHandler))),
        ),
        (
            "advisor",
            Arc::new(AgentTemplate::new(advisor, Arc::new(ReviewHandler))),
        ),
        (
            "validator",
            Arc::new(AgentTemplate::new(validator, Arc::new(ReviewHandler))),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SECURITY_REVIEWER: &str = r#"
name: security-reviewer
description: Reviews changes for security problems
model: claude-3-5-sonnet-20240620
role: specialist
specialization: security
tools: [read, grep, glob]
task_types: [audit_dependencies, review_auth]
system_prompt: You are a security engineer.
"#;

    #[test]
    fn test_parse_definition() {
        let definition = AgentDefinition::from_yaml(SECURITY_REVIEWER).unwrap();

        assert_eq!(definition.spec.name, "security-reviewer");
        assert_eq!(definition.spec.role, Role::Specialist);
        assert_eq!(definition.spec.tools.len(), 3);
        assert!(definition.handler().handles("review_auth"));
        assert!(!definition.handler().handles("implement_feature"));
    }

    #[test]
    fn test_definition_needs_task_types() {
        let raw = "name: idle\ndescription: Does nothing\nmodel: claude-3-haiku-20240307\nrole: creator\n";
        assert!(matches!(
            AgentDefinition::from_yaml(raw),
            Err(OrchestratorError::Configuration(_))
        ));
    }

    #[test]
    fn test_validator_definition_reviews() {
        let raw = "name: second-opinion\ndescription: Reviews\nmodel: gemini-1.5-flash\nrole: advisor\n";
        let definition = AgentDefinition::from_yaml(raw).unwrap();
        assert!(definition.handler().handles("validate_post_execution"));
    }

    #[test]
    fn test_load_definitions_sorted() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("b.yaml"), SECURITY_REVIEWER).unwrap();
        std::fs::write(
            temp_dir.path().join("a.yml"),
            "name: translator\ndescription: Translates docs\nmodel: claude-3-haiku-20240307\nrole: specialist\ntask_types: [translate_docs]\n",
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let definitions = load_definitions(temp_dir.path()).unwrap();
        let names: Vec<_> = definitions.iter().map(|d| d.spec.name.as_str()).collect();
        assert_eq!(names, vec!["translator", "security-reviewer"]);
    }

    #[test]
    fn test_load_definitions_reports_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("broken.yaml"), "name: [").unwrap();

        let err = load_definitions(temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn test_builtin_types_are_valid() {
        let types = builtin_types();
        assert_eq!(types.len(), 5);
        for (name, factory) in types {
            let spec = factory.blueprint();
            assert_eq!(spec.name, name);
            assert!(spec.validate().is_ok(), "{} should validate", name);
        }
    }

    #[test]
    fn test_advisor_blueprint_is_read_only() {
        let (_, advisor) = builtin_types()
            .into_iter()
            .find(|(name, _)| *name == "advisor")
            .unwrap();
        assert!(advisor.blueprint().capabilities.is_read_only());
        assert!(!advisor.handler().handles("implement_feature"));
    }
}
