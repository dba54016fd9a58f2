mod common;

use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_stream::StreamExt;

use pantheon::config::RegistryConfig;
use pantheon::events::DomainEvent;
use pantheon::providers::LocalBackend;
use pantheon::registry::AgentOverrides;
use pantheon::tools::ToolKind;
use pantheon::validation::ValidationConfig;
use pantheon::{AgentState, Config, ErrorKind, Registry, Role, Task};

use common::{registry, registry_with};

#[test]
fn test_capability_invariant_holds_for_every_type() {
    let temp_dir = TempDir::new().unwrap();
    let registry = registry(temp_dir.path());

    let cases = [
        ("architect", AgentOverrides::default()),
        ("builder", AgentOverrides::default()),
        ("builder", AgentOverrides::default().with_model("gemini-1.5-flash")),
        ("documenter", AgentOverrides::default()),
        ("advisor", AgentOverrides::default()),
        ("validator", AgentOverrides::default().with_model("claude-3-opus-20240229")),
    ];

    for (type_name, overrides) in cases {
        let agent = registry.create_agent(type_name, overrides).unwrap();
        let forced = agent.role().is_validator_class() || agent.model().starts_with("gemini");

        if forced {
            assert!(
                agent.capabilities().is_read_only(),
                "{} on {} should be read-only",
                type_name,
                agent.model()
            );
            for kind in [ToolKind::Write, ToolKind::Edit, ToolKind::Bash] {
                assert!(!agent.tools().is_allowed(kind), "{} kept {:?}", type_name, kind);
            }
        }
    }

    let builder = registry
        .get_agents_by_role(Role::Creator)
        .into_iter()
        .find(|a| a.model().contains("sonnet"))
        .unwrap();
    assert!(builder.tools().is_allowed(ToolKind::Bash));
    assert!(builder.tools().is_allowed(ToolKind::Write));
}

#[test]
fn test_per_type_cap() {
    let temp_dir = TempDir::new().unwrap();
    let registry = registry(temp_dir.path());

    for _ in 0..5 {
        registry
            .create_agent("builder", AgentOverrides::default())
            .unwrap();
    }
    let err = registry
        .create_agent("builder", AgentOverrides::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    assert_eq!(registry.len(), 5);

    // other types are unaffected
    assert!(registry
        .create_agent("architect", AgentOverrides::default())
        .is_ok());
}

#[test]
fn test_total_cap_checked_before_type() {
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig {
        max_total_agents: 2,
        ..RegistryConfig::default()
    };
    let registry = registry_with(temp_dir.path(), config, ValidationConfig::default());

    registry.create_agent("builder", AgentOverrides::default()).unwrap();
    registry.create_agent("architect", AgentOverrides::default()).unwrap();

    let err = registry
        .create_agent("no_such_type", AgentOverrides::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_respects_cap() {
    let temp_dir = TempDir::new().unwrap();
    let registry = registry(temp_dir.path());

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.create_agent("builder", AgentOverrides::default()) })
        })
        .collect();

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::CapacityExceeded);
                rejected += 1;
            }
        }
    }

    assert_eq!(created, 5);
    assert_eq!(rejected, 5);
    assert_eq!(registry.statistics().agents_by_type["builder"], 5);
}

#[test]
fn test_from_config_loads_definitions() {
    let temp_dir = TempDir::new().unwrap();
    let defs = temp_dir.path().join("agents");
    std::fs::create_dir(&defs).unwrap();
    std::fs::write(
        defs.join("security.yaml"),
        r#"
name: security-reviewer
description: Reviews changes for security problems
model: claude-3-5-sonnet-20240620
role: specialist
specialization: security
tools: [read, grep, glob]
task_types: [audit_dependencies, review_auth]
system_prompt: You are a security engineer.
"#,
    )
    .unwrap();
    std::fs::write(defs.join("notes.txt"), "not a definition").unwrap();

    let config = Config::from_toml_str(&format!(
        r#"
sandbox_root = "{root}"

[registry]
max_total_agents = 8
definitions_dir = "{defs}"
"#,
        root = temp_dir.path().display(),
        defs = defs.display()
    ))
    .unwrap();

    let registry = Registry::from_config(&config, Arc::new(LocalBackend::new())).unwrap();
    assert!(registry.has_type("security-reviewer"));
    assert!(registry.has_type("builder"));
    assert_eq!(registry.statistics().max_total_agents, 8);

    let agent = registry
        .create_agent("security-reviewer", AgentOverrides::default())
        .unwrap();
    assert_eq!(agent.specialization(), Some("security"));
    assert!(agent.handles("review_auth"));
    assert!(!agent.tools().is_allowed(ToolKind::Write));
}

#[test]
fn test_duplicate_definition_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("builder.yaml"),
        "name: builder\ndescription: shadow\nmodel: claude-3-haiku-20240307\nrole: creator\ntask_types: [build]\n",
    )
    .unwrap();

    let registry = registry(temp_dir.path());
    let err = registry.load_definitions(temp_dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateType);
}

#[tokio::test]
async fn test_execute_by_name_creates_agent_on_demand() {
    let temp_dir = TempDir::new().unwrap();
    let registry = registry(temp_dir.path());
    assert!(registry.is_empty());

    let output = registry
        .execute(
            "documenter",
            Task::new("document_readme", json!({"topic": "getting started"})),
        )
        .await
        .unwrap();
    assert!(output.content.is_object());

    let documenter = registry.get_agent_by_name("documenter").unwrap();
    assert_eq!(documenter.metrics().tasks_succeeded, 1);

    // reuses the same agent, found by id this time
    registry
        .execute(
            &documenter.id().to_string(),
            Task::new("document_api", json!({"topic": "registry"})),
        )
        .await
        .unwrap();
    assert_eq!(registry.get_agents_by_role(Role::Specialist).len(), 1);
    assert_eq!(documenter.metrics().tasks_succeeded, 2);

    let err = registry
        .execute("nobody", Task::new("document_api", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AgentNotFound);
}

#[test]
fn test_task_routing() {
    let temp_dir = TempDir::new().unwrap();
    let registry = registry(temp_dir.path());
    for type_name in ["architect", "builder", "documenter", "advisor"] {
        registry
            .create_agent(type_name, AgentOverrides::default())
            .unwrap();
    }

    let names = |task: &str| -> Vec<String> {
        registry
            .get_agents_for_task(task)
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    };

    let producers = names("implement_cache");
    assert!(producers.contains(&"builder".to_string()));
    assert!(!producers.contains(&"advisor".to_string()));

    assert_eq!(names("review_code"), vec!["advisor".to_string()]);
    assert!(names("translate_legal").is_empty());
}

#[tokio::test]
async fn test_events_report_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let registry = registry(temp_dir.path());
    let mut events = Box::pin(registry.events().stream());

    let agent = registry
        .create_agent("architect", AgentOverrides::default())
        .unwrap();
    registry.terminate_agent(agent.id()).unwrap();

    match events.next().await.unwrap().event {
        DomainEvent::AgentCreated { agent_id, name, .. } => {
            assert_eq!(agent_id, agent.id());
            assert_eq!(name, "architect");
        }
        other => panic!("unexpected event {:?}", other),
    }
    match events.next().await.unwrap().event {
        DomainEvent::AgentTerminated { agent_id, .. } => assert_eq!(agent_id, agent.id()),
        other => panic!("unexpected event {:?}", other),
    }

    assert_eq!(agent.state(), AgentState::Terminated);
    assert!(registry.get_agent(agent.id()).is_none());
    assert_eq!(
        registry.terminate_agent(agent.id()).unwrap_err().kind(),
        ErrorKind::AgentNotFound
    );
}

#[test]
fn test_health_check_flags_capacity() {
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig {
        max_total_agents: 2,
        ..RegistryConfig::default()
    };
    let registry = registry_with(temp_dir.path(), config, ValidationConfig::default());

    assert!(registry.health_check().healthy);
    registry.create_agent("builder", AgentOverrides::default()).unwrap();
    registry.create_agent("architect", AgentOverrides::default()).unwrap();

    let report = registry.health_check();
    assert_eq!(report.total_agents, 2);
    assert!(!report.healthy);
    assert!(report.issues.iter().any(|i| i.contains("capacity")));

    assert_eq!(registry.terminate_all(), 2);
    assert!(registry.is_empty());
}
