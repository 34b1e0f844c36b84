//! Help output specs

use crate::prelude::*;

#[test]
fn help_lists_every_command() {
    let temp = Project::empty();

    let run = temp.uj().args(&["--help"]).passes();
    let run = run.stdout_has("digest").stdout_has("show").stdout_has("keys");
    run.stdout_has("unlock").stdout_has("sweep");
}

#[test]
fn sweep_help_documents_threshold() {
    let temp = Project::empty();

    temp.uj()
        .args(&["sweep", "--help"])
        .passes()
        .stdout_has("--stale-after");
}

#[test]
fn version_flag_prints_version() {
    let temp = Project::empty();

    temp.uj()
        .args(&["--version"])
        .passes()
        .stdout_has(env!("CARGO_PKG_VERSION"));
}
