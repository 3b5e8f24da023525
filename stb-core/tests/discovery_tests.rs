//! Discovery and config integration tests.
//! Fleets are laid out in `assert_fs` temp directories: `<root>/<service>/.env{,.example}`.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use std::path::PathBuf;
use stb_core::{config, discovery, DiscoveryError};

fn service(root: &assert_fs::TempDir, name: &str, env: &str, example: &str) {
    root.child(name).child(".env").write_str(env).expect("write .env");
    root.child(name)
        .child(".env.example")
        .write_str(example)
        .expect("write .env.example");
}

// ---------------------------------------------------------------------------
// 1. Fleet construction
// ---------------------------------------------------------------------------

#[test]
fn fleet_loads_env_template_and_manifest() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    service(&root, "billing", "SERVICE_PORT=8000\n", "SERVICE_PORT=\nAUTH_URL=\n");
    root.child("billing/.helm/values.yaml")
        .write_str("auth_url:\n  review: https://auth.review.internal\n")
        .expect("write manifest");

    let fleet = discovery::gather_services_at(root.path(), &[PathBuf::from("billing")])
        .expect("gather");
    let billing = fleet.iter().next().expect("one service");

    assert_eq!(billing.dotenv.get("SERVICE_PORT"), Some("8000"));
    assert_eq!(billing.dotenv_example.keys(), vec!["SERVICE_PORT", "AUTH_URL"]);
    let manifest = billing.yaml_config.as_ref().expect("manifest");
    assert_eq!(
        manifest.review_default("AUTH_URL"),
        Some("https://auth.review.internal")
    );
}

#[test]
fn same_service_twice_is_rejected() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    service(&root, "billing", "", "");

    let err = discovery::gather_services_at(
        root.path(),
        &[PathBuf::from("billing"), PathBuf::from("./billing")],
    )
    .unwrap_err();
    assert!(matches!(err, DiscoveryError::DuplicateService { .. }), "got: {err}");
}

#[test]
fn unknown_path_is_reported_with_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let err = discovery::gather_services_at(root.path(), &[PathBuf::from("ghost")]).unwrap_err();
    assert!(matches!(err, DiscoveryError::ServiceNotFound { .. }));
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn empty_workspace_yields_empty_fleet() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let fleet = discovery::gather_services_at(root.path(), &[]).expect("gather");
    assert!(fleet.is_empty());
}

// ---------------------------------------------------------------------------
// 2. Config file
// ---------------------------------------------------------------------------

#[test]
fn config_set_creates_private_dir_and_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::set_env_var_at(home.path(), "SENTRY_DSN", "https://sentry.local").expect("set");

    home.child(".stb/config.yaml").assert(predicate::path::exists());
    home.child(".stb/config.yaml")
        .assert(predicate::str::contains("SENTRY_DSN: https://sentry.local"));
}

#[test]
fn corrupt_config_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".stb/config.yaml")
        .write_str("env_vars: [unclosed")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(err.to_string().contains("config.yaml"), "got: {err}");
}
