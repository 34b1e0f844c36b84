//! Digest computation specs

use crate::prelude::*;

#[test]
fn digest_of_item_is_stable() {
    let temp = Project::empty();

    temp.uj()
        .args(&["digest", "--class", "ReportJob", r#"[1,"daily"]"#])
        .passes()
        .stdout_eq(
            "uniquejobs:5501755fcfc8004967f34a157ac72ca38e527c85e392bd8535441e4793f74d8e\n",
        );
}

#[test]
fn digest_without_args_hashes_empty_list() {
    let temp = Project::empty();

    temp.uj()
        .args(&["digest", "--class", "ReportJob"])
        .passes()
        .stdout_eq(
            "uniquejobs:bf9730e1e5c7905fbefb82c573c8955c688988932f64c9103b6ff2058640c7d0\n",
        );
}

#[test]
fn digest_uses_configured_prefix() {
    let temp = Project::with_config("unique_prefix = \"locks\"\n");
    let path = temp.config_path();

    temp.uj()
        .args(&["--config", path.to_str().unwrap(), "digest", "--class", "ReportJob"])
        .passes()
        .stdout_has("locks:bf9730e1e5c7905fbefb82c573c8955c688988932f64c9103b6ff2058640c7d0");
}

#[test]
fn digest_json_output() {
    let temp = Project::empty();

    temp.uj()
        .args(&["--output", "json", "digest", "--class", "ReportJob"])
        .passes()
        .stdout_has(r#""digest": "uniquejobs:bf9730e1"#);
}

#[test]
fn digest_rejects_non_array_args() {
    let temp = Project::empty();

    temp.uj()
        .args(&["digest", "--class", "ReportJob", r#"{"id":1}"#])
        .fails()
        .stderr_has("arguments must be a JSON array");
}
