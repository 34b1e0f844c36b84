//! Shared helpers for CLI specs

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

/// A scratch directory the CLI runs in
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn empty() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// A project with `uj.toml` holding `content`
    pub fn with_config(content: &str) -> Self {
        let project = Self::empty();
        std::fs::write(project.config_path(), content).unwrap();
        project
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("uj.toml")
    }

    pub fn uj(&self) -> CliRun {
        let mut cmd = Command::cargo_bin("uj").unwrap();
        cmd.current_dir(self.dir.path()).env_remove("RUST_LOG");
        CliRun { cmd }
    }
}

pub struct CliRun {
    cmd: Command,
}

impl CliRun {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    /// Run, requiring a zero exit status
    pub fn passes(mut self) -> RunAssert {
        let output = self.cmd.output().unwrap();
        let run = RunAssert::from(output.clone());
        assert!(
            output.status.success(),
            "expected success, got {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status,
            run.stdout,
            run.stderr
        );
        run
    }

    /// Run, requiring a non-zero exit status
    pub fn fails(mut self) -> RunAssert {
        let output = self.cmd.output().unwrap();
        let run = RunAssert::from(output.clone());
        assert!(
            !output.status.success(),
            "expected failure\nstdout:\n{}\nstderr:\n{}",
            run.stdout,
            run.stderr
        );
        run
    }
}

pub struct RunAssert {
    stdout: String,
    stderr: String,
}

impl From<std::process::Output> for RunAssert {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

impl RunAssert {
    pub fn stdout_has(self, expected: &str) -> Self {
        assert!(
            self.stdout.contains(expected),
            "stdout missing {expected:?}:\n{}",
            self.stdout
        );
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        assert!(
            self.stderr.contains(expected),
            "stderr missing {expected:?}:\n{}",
            self.stderr
        );
        self
    }

    pub fn stdout_eq(self, expected: &str) -> Self {
        similar_asserts::assert_eq!(self.stdout, expected);
        self
    }
}
