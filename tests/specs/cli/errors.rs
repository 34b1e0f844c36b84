//! CLI error specs

use crate::prelude::*;

#[test]
fn unknown_command_fails() {
    let temp = Project::empty();

    temp.uj()
        .args(&["frobnicate"])
        .fails()
        .stderr_has("unrecognized subcommand");
}

#[test]
fn sweep_requires_stale_after() {
    let temp = Project::empty();

    temp.uj()
        .args(&["sweep", "uniquejobs:abc"])
        .fails()
        .stderr_has("--stale-after");
}

#[test]
fn negative_stale_after_is_rejected() {
    let temp = Project::empty();

    temp.uj()
        .args(&["sweep", "uniquejobs:abc", "--stale-after=-1"])
        .fails()
        .stderr_has("invalid number of seconds");
}

#[test]
fn missing_config_file_is_reported() {
    let temp = Project::empty();

    temp.uj()
        .args(&["--config", "absent.toml", "digest", "--class", "ReportJob"])
        .fails()
        .stderr_has("failed to read absent.toml");
}

#[test]
fn invalid_config_is_reported() {
    let temp = Project::with_config("unique_prefix = \"\"\n");
    let path = temp.config_path();

    temp.uj()
        .args(&["--config", path.to_str().unwrap(), "digest", "--class", "ReportJob"])
        .fails()
        .stderr_has("unique_prefix must not be empty");
}
