//! Integration Test: Dependency Boundaries
//!
//! **Policy**: `birdwatch-core` is a library. Argument parsing, subscriber
//! installation and catch-all error types belong to the daemon.

use std::fs;

use architectural_enforcement::workspace_root;

const BINARY_ONLY: &[&str] = &["clap", "tracing-subscriber", "anyhow"];

/// Names listed under `[dependencies]` of a manifest
fn dependency_names(manifest: &str) -> Vec<String> {
    let mut in_deps = false;
    let mut names = Vec::new();
    for line in manifest.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_deps = line == "[dependencies]";
            continue;
        }
        if !in_deps || line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((name, _)) = line.split_once('=') {
            names.push(name.trim().to_string());
        }
    }
    names
}

#[test]
fn test_core_has_no_binary_only_dependencies() {
    let manifest = fs::read_to_string(workspace_root().join("birdwatch/core/Cargo.toml"))
        .expect("core manifest readable");
    let names = dependency_names(&manifest);

    assert!(names.iter().any(|n| n == "tokio"));
    let offending: Vec<_> = names
        .iter()
        .filter(|n| BINARY_ONLY.contains(&n.as_str()))
        .collect();
    assert!(
        offending.is_empty(),
        "birdwatch-core depends on binary-only crates: {offending:?}"
    );
}

#[test]
fn test_daemon_depends_on_core_by_path() {
    let manifest = fs::read_to_string(workspace_root().join("birdwatch/daemon/Cargo.toml"))
        .expect("daemon manifest readable");
    assert!(manifest.contains("birdwatch-core = { path = \"../core\" }"));
}
