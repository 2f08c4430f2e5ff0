use predicates::prelude::*;

mod common;

#[test]
fn test_build_missing_file() {
    let mut ctx = common::vmbake();
    ctx.cmd
        .args(["build", "--file", "/nonexistent/image.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file /nonexistent/image.yaml"));
}

#[test]
fn test_build_unknown_step_kind() {
    let mut ctx = common::vmbake();
    let file = ctx.write_file("image.yaml", "name: x\nsteps:\n  - kind: reboot\n");
    ctx.cmd
        .arg("build")
        .arg("--file")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("reboot"));
    assert!(!ctx.builds_dir().exists());
}

#[test]
fn test_build_rejects_unsatisfied_dependency() {
    let mut ctx = common::vmbake();
    let file = ctx.write_file(
        "image.yaml",
        "name: k8s\nsteps:\n  - kind: run-script\n    path: setup.sh\n  - kind: prepull-k8s-images\n",
    );
    ctx.cmd
        .arg("build")
        .arg("--file")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid image config"))
        .stderr(predicate::str::contains("at position 2 requires 'install-k8s'"));
    assert!(!ctx.builds_dir().exists());
}

#[test]
fn test_build_name_override_is_validated() {
    let mut ctx = common::vmbake();
    let file = ctx.write_file("image.json", r#"{"name": "ok", "steps": []}"#);
    ctx.cmd
        .arg("build")
        .arg("--file")
        .arg(&file)
        .args(["--name", "bad name"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid image name 'bad name'"));
}

#[test]
fn test_build_reaches_backend_with_valid_config() {
    let mut ctx = common::vmbake();
    let file = ctx.write_file("image.yaml", "name: plain\n");
    ctx.cmd
        .arg("build")
        .arg("--file")
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Creating VM base image \"plain\"..."))
        .stderr(predicate::str::contains("not found: base image"));
    assert!(ctx.builds_dir().exists());
}
