//! Loads the fixture `trackql.toml` and checks the registry it declares.

use std::path::PathBuf;
use trackql_kernel::{FieldKind, Literal, TrackqlConfig};

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/trackql.toml")
}

#[test]
fn fixture_config_builds_registry() {
    let config = TrackqlConfig::load(fixture_path()).expect("fixture should load");
    assert_eq!(config.store.default_prefix, "DEV");
    assert_eq!(config.store.lock_retries, 3);

    let registry = config.build_registry().expect("registry should build");
    let names: Vec<&str> = registry.types().map(|t| t.name()).collect();
    assert_eq!(names, vec!["bug", "task"]);

    let bug = registry.record_type("bug").expect("bug type");
    let declared: Vec<&str> = bug.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        declared,
        vec![
            "project",
            "issueType",
            "summary",
            "assignee",
            "created",
            "labels",
            "epic",
            "story_points"
        ]
    );

    let epic = registry.lookup("bug", "epic").expect("epic field");
    assert_eq!(epic.remote_id, "parent");
    assert_eq!(epic.kind, FieldKind::Reference);

    let points = registry.lookup("bug", "story_points").expect("points field");
    assert_eq!(points.query_identifier(), "cf[10016]");

    let scope: Vec<(&str, &Literal)> = registry
        .scope_of("bug")
        .expect("scope")
        .iter()
        .map(|c| (c.field.name.as_str(), &c.value))
        .collect();
    assert_eq!(
        scope,
        vec![
            ("project", &Literal::text("DEV")),
            ("issueType", &Literal::text("Bug"))
        ]
    );
    assert!(registry.scope_of("task").expect("task scope").is_empty());
}

#[test]
fn scope_on_undeclared_field_fails_to_load() {
    let raw = r#"
        [[types]]
        name = "bug"
        fields = [{ name = "project", kind = "text" }]
        scope = [{ field = "component", text = "api" }]
    "#;
    let config = TrackqlConfig::from_toml_str(raw).expect("parses");
    let err = config.build_registry().expect_err("undeclared scope field");
    insta::assert_snapshot!(
        err.to_string(),
        @"scope constraint `component` on `bug`: field is not declared on this type"
    );
}
