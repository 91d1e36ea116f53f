//! Black-box CLI coverage: spawns the real `lockbox` binary with a
//! per-test `LOCKBOX_HOME`, so runs never touch the host install root and
//! never interfere with each other.

use assert_cmd::Command;
use predicates::prelude::*;

fn lockbox(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("lockbox").unwrap();
    cmd.env("LOCKBOX_HOME", home);
    cmd
}

#[test]
fn test_ps_reports_no_containers_initially() {
    let home = tempfile::tempdir().unwrap();
    lockbox(home.path())
        .arg("ps")
        .assert()
        .success()
        .stdout(predicate::str::contains("No running containers."));
}

#[test]
fn test_images_reports_none_initially() {
    let home = tempfile::tempdir().unwrap();
    lockbox(home.path())
        .arg("images")
        .assert()
        .success()
        .stdout(predicate::str::contains("No images found."));
}

#[test]
fn test_inspect_unknown_container_fails() {
    let home = tempfile::tempdir().unwrap();
    lockbox(home.path())
        .args(["inspect", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_stop_unknown_container_fails() {
    let home = tempfile::tempdir().unwrap();
    lockbox(home.path())
        .args(["stop", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_run_with_unbuilt_image_fails() {
    let home = tempfile::tempdir().unwrap();
    lockbox(home.path())
        .args(["run", "no-such-image"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("run 'lockbox build' first"));
}

#[test]
fn test_build_produces_listed_image() {
    let home = tempfile::tempdir().unwrap();
    let ctx = tempfile::tempdir().unwrap();
    std::fs::write(ctx.path().join("app.lbox"), "BOX_BASE scratch\nBOX_ENV GREETING=hi\n").unwrap();

    let images_dir = home.path().join("images");
    std::fs::create_dir_all(&images_dir).unwrap();
    std::fs::write(images_dir.join("scratch.tar"), b"").unwrap();

    lockbox(home.path())
        .args(["build", ctx.path().to_str().unwrap(), "-t", "myapp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Built image: myapp"));

    lockbox(home.path())
        .arg("images")
        .assert()
        .success()
        .stdout(predicate::str::contains("myapp"));
}

#[test]
fn test_create_up_rejects_conflicting_recreate_flags() {
    let home = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    lockbox(home.path())
        .current_dir(project.path())
        .args(["create", "up", "--force-recreate", "--no-recreate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn test_create_down_with_no_manifest_is_a_noop() {
    let home = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    lockbox(home.path())
        .current_dir(project.path())
        .args(["create", "down"])
        .assert()
        .success();
}
