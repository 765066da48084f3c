//! Integration tests for the `kiln` binary.

#![allow(deprecated)] // Command::cargo_bin

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A `kiln` command isolated from the caller's environment and config.
fn kiln(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.current_dir(home.path())
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path());
    for (key, _) in std::env::vars() {
        if key.starts_with("KILN_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

fn render(home: &TempDir) -> Command {
    let mut cmd = kiln(home);
    cmd.arg("render")
        .arg(fixture("module.json"))
        .arg("--provider")
        .arg(fixture("provider.json"))
        .arg("--elements")
        .arg(fixture("elements.json"));
    cmd
}

fn names(resources: &Value) -> Vec<String> {
    resources
        .as_array()
        .unwrap()
        .iter()
        .map(|r| format!("{}/{}", r["kind"].as_str().unwrap(), r["metadata"]["name"].as_str().unwrap()))
        .collect()
}

#[test]
fn help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    kiln(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("flatten"))
        .stdout(predicate::str::contains("provider"));
}

#[test]
fn version_flag() {
    let home = TempDir::new().unwrap();
    kiln(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn render_writes_a_json_array_in_component_and_transformer_order() {
    let home = TempDir::new().unwrap();
    let out = render(&home).assert().success().get_output().stdout.clone();

    let resources: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(
        names(&resources),
        vec![
            "Deployment/api",
            "HorizontalPodAutoscaler/api-hpa",
            "Service/api-svc",
            "Deployment/worker",
            "HorizontalPodAutoscaler/worker-hpa",
        ]
    );
    assert_eq!(resources[0]["metadata"]["namespace"], "default");
}

#[test]
fn render_is_stable_across_parallel_and_sequential_runs() {
    let home = TempDir::new().unwrap();
    let parallel = render(&home).assert().success().get_output().stdout.clone();
    let again = render(&home).assert().success().get_output().stdout.clone();
    let sequential = render(&home)
        .arg("--sequential")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(parallel, again);
    assert_eq!(parallel, sequential);
}

#[test]
fn render_yaml_stream_with_namespace() {
    let home = TempDir::new().unwrap();
    render(&home)
        .args(["--namespace", "prod", "--format", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("---\n"))
        .stdout(predicate::str::contains("kind: HorizontalPodAutoscaler"))
        .stdout(predicate::str::contains("namespace: prod"))
        .stdout(predicate::str::contains("namespace: default").not());
}

#[test]
fn render_to_file() {
    let home = TempDir::new().unwrap();
    let target = home.path().join("manifests.json");
    render(&home)
        .arg("--output")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written: Value = serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(written.as_array().unwrap().len(), 5);
}

#[test]
fn dry_run_reports_the_plan_only() {
    let home = TempDir::new().unwrap();
    render(&home)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("k8s.ScaledDeployment -> 2 resource(s)"))
        .stdout(predicate::str::contains("5 resource(s) would be written"))
        .stdout(predicate::str::contains("apiVersion").not());
}

#[test]
fn strategy_all_selects_every_covering_transformer() {
    let home = TempDir::new().unwrap();
    let out = render(&home)
        .args(["--strategy", "all"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let resources: Value = serde_json::from_slice(&out).unwrap();
    // k8s.Deployment now also runs for both components.
    assert_eq!(resources.as_array().unwrap().len(), 7);
}

#[test]
fn strict_mode_names_the_uncovered_element() {
    let home = TempDir::new().unwrap();
    kiln(&home)
        .arg("render")
        .arg(fixture("uncovered.json"))
        .arg("--provider")
        .arg(fixture("provider.json"))
        .arg("--strict")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("[match]"))
        .stderr(predicate::str::contains("x.Secret"));
}

#[test]
fn lenient_mode_renders_the_covered_subset() {
    let home = TempDir::new().unwrap();
    let out = kiln(&home)
        .arg("render")
        .arg(fixture("uncovered.json"))
        .arg("--provider")
        .arg(fixture("provider.json"))
        .assert()
        .success()
        .stderr(predicate::str::contains("no transformer covers 'x.Secret'"))
        .get_output()
        .stdout
        .clone();

    let resources: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(names(&resources), vec!["Deployment/secrets"]);
}

#[test]
fn missing_provider_file_is_not_found() {
    let home = TempDir::new().unwrap();
    kiln(&home)
        .arg("render")
        .arg(fixture("module.json"))
        .arg("--provider")
        .arg(home.path().join("nope.json"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("path not found"));
}

#[test]
fn render_without_provider_suggests_the_flag() {
    let home = TempDir::new().unwrap();
    kiln(&home)
        .arg("render")
        .arg(fixture("module.json"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No provider given"))
        .stderr(predicate::str::contains("--provider"));
}

#[test]
fn provider_path_can_come_from_the_environment() {
    let home = TempDir::new().unwrap();
    kiln(&home)
        .env("KILN_PROVIDERS__PATH", fixture("provider.json"))
        .env("KILN_RENDER__NAMESPACE", "staging")
        .arg("render")
        .arg(fixture("module.json"))
        .arg("--elements")
        .arg(fixture("elements.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"namespace\": \"staging\""));
}

#[test]
fn unknown_strategy_is_a_usage_error() {
    let home = TempDir::new().unwrap();
    render(&home)
        .args(["--strategy", "first"])
        .assert()
        .code(2);
}

#[test]
fn flatten_shows_elements_with_provenance() {
    let home = TempDir::new().unwrap();
    kiln(&home)
        .arg("flatten")
        .arg(fixture("module.json"))
        .arg("--elements")
        .arg(fixture("elements.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Component api"))
        .stdout(predicate::str::contains("Component worker"))
        .stdout(predicate::str::contains("x.Container"))
        .stdout(predicate::str::contains("x.Stateless"))
        .stdout(predicate::str::contains("x.Expose"))
        .stdout(predicate::str::contains("direct"));
}

#[test]
fn provider_shows_transformers_and_declarations() {
    let home = TempDir::new().unwrap();
    kiln(&home)
        .arg("provider")
        .arg(fixture("provider.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Provider kubernetes@1.0.0"))
        .stdout(predicate::str::contains("Transformers (3)"))
        .stdout(predicate::str::contains("k8s.ScaledDeployment"))
        .stdout(predicate::str::contains("traits: Replicas, Expose"));
}

#[test]
fn config_show_reflects_file_and_environment() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("kiln.toml");
    fs::write(&file, "[render]\nstrategy = \"all\"\n").unwrap();

    kiln(&home)
        .env("KILN_RENDER__NAMESPACE", "staging")
        .arg("--config")
        .arg(&file)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[render]"))
        .stdout(predicate::str::contains("strategy = \"all\""))
        .stdout(predicate::str::contains("namespace = \"staging\""));
}

#[test]
fn invalid_config_exits_with_configuration_code() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("kiln.toml");
    fs::write(&file, "[render]\nmax_workers = 0\n").unwrap();

    kiln(&home)
        .arg("--config")
        .arg(&file)
        .args(["config", "show"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("max_workers"));
}
