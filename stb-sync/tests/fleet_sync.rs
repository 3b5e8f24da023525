use std::fs;
use std::path::Path;

use rstest::rstest;
use stb_core::{discovery::gather_services_at, EnvOverrides, ServiceName};
use stb_sync::{
    pipeline::{refresh_env, refresh_ports},
    ports::{env_field_for, BASE_PORT},
    WriteResult,
};
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn make_service(root: &Path, name: &str, env: &str, example: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("create service dir");
    fs::write(dir.join(".env"), env).expect("write .env");
    fs::write(dir.join(".env.example"), example).expect("write .env.example");
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(12)]
fn ports_are_contiguous_from_base(#[case] count: usize) {
    init_logging();
    let workspace = TempDir::new().expect("workspace");
    for idx in 0..count {
        make_service(workspace.path(), &format!("svc-{idx:02}"), "", "");
    }
    let mut fleet = gather_services_at(workspace.path(), &[]).expect("fleet");

    refresh_ports(&mut fleet, false).expect("refresh ports");

    for (idx, service) in fleet.iter().enumerate() {
        let expected = (BASE_PORT as usize + idx).to_string();
        let on_disk = fs::read_to_string(service.dotenv_path()).expect("read .env");
        assert_eq!(on_disk, format!("SERVICE_PORT={expected}\n"));
    }
}

#[test]
fn second_port_refresh_changes_nothing() {
    init_logging();
    let workspace = TempDir::new().expect("workspace");
    make_service(workspace.path(), "orders", "PAYMENTS_URL=\n", "");
    make_service(workspace.path(), "payments", "ORDERS_URL=https://orders\n", "");
    let mut fleet = gather_services_at(workspace.path(), &[]).expect("fleet");
    refresh_ports(&mut fleet, false).expect("first refresh");

    let mut fleet = gather_services_at(workspace.path(), &[]).expect("reload");
    let writes = refresh_ports(&mut fleet, false).expect("second refresh");

    assert!(writes
        .iter()
        .all(|w| matches!(w.result, WriteResult::Unchanged { .. })));
    let payments = fs::read_to_string(workspace.path().join("payments/.env")).expect("read");
    assert_eq!(
        payments,
        "ORDERS_URL=http://localhost:8000\nSERVICE_PORT=8001\n"
    );
}

#[test]
fn env_refresh_keeps_comments_and_existing_values() {
    init_logging();
    let workspace = TempDir::new().expect("workspace");
    make_service(
        workspace.path(),
        "ledger",
        "# local overrides\nDEBUG=true   # verbose\n\n",
        "DEBUG=false\nREDIS_HOST=localhost\nAPI_TOKEN=\n",
    );
    let mut fleet = gather_services_at(workspace.path(), &[]).expect("fleet");
    let overrides: EnvOverrides = [("API_TOKEN", "t0k3n")].into_iter().collect();

    refresh_env(&mut fleet, &overrides, false).expect("refresh env");

    let content = fs::read_to_string(workspace.path().join("ledger/.env")).expect("read");
    assert_eq!(
        content,
        "# local overrides\nDEBUG=true   # verbose\n\nREDIS_HOST=localhost\nAPI_TOKEN=t0k3n\n"
    );
}

#[test]
fn dry_run_never_touches_disk() {
    init_logging();
    let workspace = TempDir::new().expect("workspace");
    make_service(workspace.path(), "a", "", "NEW=1\n");
    let mut fleet = gather_services_at(workspace.path(), &[]).expect("fleet");

    let writes = refresh_env(&mut fleet, &EnvOverrides::default(), true).expect("dry run");

    assert!(matches!(writes[0].result, WriteResult::WouldWrite { .. }));
    assert!(writes[0].diff.is_some());
    assert_eq!(
        fs::read_to_string(workspace.path().join("a/.env")).expect("read"),
        ""
    );
}

#[rstest]
#[case("billing", "BILLING_URL")]
#[case("user-profile", "USER_PROFILE_URL")]
#[case("a-b-c", "A_B_C_URL")]
fn url_field_names(#[case] service: &str, #[case] field: &str) {
    assert_eq!(env_field_for(&ServiceName::from(service)), field);
}
