#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Isolated vmbake home for one test.
pub struct TestContext {
    pub cmd: Command,
    pub home: TempDir,
}

impl TestContext {
    /// Another command against the same home.
    pub fn new_cmd(&self) -> Command {
        command(self.home.path())
    }

    pub fn builds_dir(&self) -> PathBuf {
        self.home.path().join("builds")
    }

    pub fn image_path(&self, name: &str) -> PathBuf {
        self.home.path().join("images").join(format!("{}.qcow2", name))
    }

    /// Write a file into the home directory and return its path.
    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.home.path().join(name);
        std::fs::write(&path, contents).expect("Failed to write test file");
        path
    }
}

fn command(home: &Path) -> Command {
    let bin_path = env!("CARGO_BIN_EXE_vmbake");
    let mut cmd = Command::new(bin_path);
    cmd.timeout(Duration::from_secs(30));
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("VMBAKE_HOME");
    cmd.arg("--home").arg(home);
    cmd
}

pub fn vmbake() -> TestContext {
    let home = TempDir::new().expect("Failed to create temp home");
    TestContext {
        cmd: command(home.path()),
        home,
    }
}
