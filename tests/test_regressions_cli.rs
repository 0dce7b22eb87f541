use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::tempdir;

const NOW_MS: &str = "1714552200000";

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_query-link")
}

fn run(args: &[&str]) -> Output {
    Command::new(bin())
        .args(["--now", NOW_MS, "--color", "never"])
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("QUERY_LINK_CONFIG")
        .env_remove("QUERY_LINK_STORAGE")
        .output()
        .expect("command should run")
}

fn json_stdout(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn write_file(path: &Path, content: &str) {
    fs::write(path, content).expect("failed to write test file");
}

#[test]
fn test_resolve_json_reports_canonical_link() {
    let output = run(&["--format", "json", "resolve", "?keyword=*&tab=graph&start_time=now-1h"]);
    let json = json_stdout(&output);

    assert_eq!(json["state"]["search_mode"], "ui");
    assert_eq!(json["state"]["time_range"]["picker"]["start"], "now-1h");
    assert_eq!(
        json["state"]["time_range"]["start"],
        1_714_552_200_000_i64 - 3_600_000
    );
    let query_string = json["query_string"].as_str().unwrap();
    assert!(query_string.contains("tab=graph"));
    assert!(!query_string.contains("keyword"));
}

#[test]
fn test_malformed_link_still_resolves() {
    let output = run(&["--format", "json", "resolve", "addition=%zz&search_mode=nope&bizId=3"]);
    let json = json_stdout(&output);
    assert_eq!(json["state"]["biz_id"], "3");
    assert_eq!(json["state"]["conditions"], Value::Array(Vec::new()));
}

#[test]
fn test_translate_both_directions() {
    let output = run(&["--format", "json", "translate", "is", "--relation", "AND"]);
    assert_eq!(json_stdout(&output)["operator"], "all contains match phrase");

    let output = run(&["--format", "json", "translate", "&=~", "--to-ui"]);
    let json = json_stdout(&output);
    assert_eq!(json["operator"], "contains match phrase");
    assert_eq!(json["relation"], "AND");
    assert_eq!(json["isInclude"], true);
}

#[test]
fn test_compile_folds_conditions_into_keyword() {
    let addition = "%5B%7B%22field%22%3A%22level%22%2C%22operator%22%3A%22%3D%22%2C%22value%22%3A%5B%22ERROR%22%5D%7D%5D";
    let query = format!("search_mode=sql&addition={addition}");
    let output = run(&["--format", "json", "compile", &query]);
    let json = json_stdout(&output);
    assert_eq!(json["outcome"], "applied");
    assert_eq!(json["keyword"], "level: \"ERROR\"");
}

#[test]
fn test_params_use_field_list() {
    let dir = tempdir().expect("temp dir");
    let fields = dir.path().join("fields.json");
    write_file(
        &fields,
        r#"[{"field_name":"msg","field_type":"text","is_case_sensitive":false}]"#,
    );

    let addition = "%5B%7B%22field%22%3A%22msg%22%2C%22operator%22%3A%22%3D~%22%2C%22value%22%3A%5B%22ERR*%22%5D%7D%5D";
    let output = run(&[
        "--format",
        "json",
        "params",
        &format!("addition={addition}"),
        "--fields",
        fields.to_str().expect("utf8 path"),
    ]);
    let json = json_stdout(&output);
    assert_eq!(json["addition"][0]["operator"], "=~");
    assert_eq!(json["addition"][0]["value"][0], "err*");
    assert_eq!(json["keyword"], "*");
}

#[test]
fn test_persisted_defaults_apply_to_next_run() {
    let dir = tempdir().expect("temp dir");
    let storage = dir.path().join("storage.json");
    let storage = storage.to_str().expect("utf8 path");

    let output = run(&["--storage", storage, "resolve", "search_mode=sql&start_time=now-2d", "--persist"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let output = run(&["--storage", storage, "--format", "json", "resolve", ""]);
    let json = json_stdout(&output);
    assert_eq!(json["state"]["search_mode"], "sql");
    assert_eq!(json["state"]["time_range"]["picker"]["start"], "now-2d");
}

#[test]
fn test_config_file_changes_defaults() {
    let dir = tempdir().expect("temp dir");
    let config = dir.path().join("query-link.toml");
    write_file(&config, "[defaults]\nstart_time = \"now-30m\"\npage_size = 20\n");

    let output = run(&[
        "--config",
        config.to_str().expect("utf8 path"),
        "--format",
        "json",
        "params",
        "",
    ]);
    let json = json_stdout(&output);
    assert_eq!(json["size"], 20);
    assert_eq!(json["start_time"], 1_714_552_200_000_i64 - 30 * 60_000);
}

#[test]
fn test_bad_config_file_fails() {
    let dir = tempdir().expect("temp dir");
    let config = dir.path().join("broken.toml");
    write_file(&config, "[defaults\n");

    let output = run(&["--config", config.to_str().expect("utf8 path"), "resolve", ""]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load config"));
}

#[test]
fn test_drill_appends_to_sql_keyword() {
    let output = run(&[
        "--format",
        "json",
        "drill",
        "search_mode=sql&keyword=timeout",
        "--field",
        "level",
        "--value",
        "ERROR",
        "--not",
    ]);
    let json = json_stdout(&output);
    assert_eq!(json["state"]["keyword"], "timeout AND NOT level: \"ERROR\"");
    assert_eq!(json["state"]["conditions"], Value::Array(Vec::new()));
}

#[test]
fn test_drill_adds_typed_condition_in_ui_mode() {
    let dir = tempdir().expect("temp dir");
    let fields = dir.path().join("fields.json");
    write_file(&fields, r#"[{"field_name":"msg","field_type":"text"}]"#);

    let output = run(&[
        "--format",
        "json",
        "drill",
        "search_mode=ui&tab=a+b",
        "--field",
        "msg",
        "--value",
        "boom",
        "--fields",
        fields.to_str().expect("utf8 path"),
    ]);
    let json = json_stdout(&output);
    assert_eq!(json["state"]["conditions"][0]["operator"], "contains match phrase");
    assert_eq!(json["state"]["conditions"][0]["value"][0], "boom");
    assert!(json["query_string"].as_str().unwrap().ends_with("&tab=a+b"));
}
