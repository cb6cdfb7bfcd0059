//! End-to-end tests of the `multisuite` binary.

mod common;

use common::abc_suite;

fn stdout(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn aggregate_writes_output_and_report() {
    let fx = abc_suite();
    let out = fx.run(&[
        "aggregate",
        "--root",
        "classes",
        "--manifest",
        "classes.toml",
        "--out",
        "build/agg",
        "--report",
        "build/report.json",
    ]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).starts_with("multisuite-tck.war: "));

    assert_eq!(
        std::fs::read_to_string(fx.path().join("build/agg/x.txt")).unwrap(),
        "hello"
    );
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(fx.path().join("build/report.json")).unwrap())
            .unwrap();
    assert_eq!(report["merged"].as_array().unwrap().len(), 3);
    assert_eq!(report["warnings"][0]["path"], "/x.txt");
    assert_eq!(report["policy"], "warn");
}

#[test]
fn aggregate_json_summary_on_stdout() {
    let fx = abc_suite();
    let out = fx.run(&[
        "aggregate",
        "--root",
        "classes",
        "--manifest",
        "classes.toml",
        "--format",
        "json",
    ]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let report: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(report["deployment"], "multisuite-tck.war");
}

#[test]
fn conflict_under_fail_policy_exits_nonzero_without_output() {
    let fx = abc_suite();
    fx.write_config("filter = \"fail\"\n");
    let out = fx.run(&[
        "aggregate",
        "--root",
        "classes",
        "--manifest",
        "classes.toml",
        "--out",
        "build/agg",
    ]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("different resource already exists at /x.txt"));
    assert!(!fx.path().join("build/agg").exists());
}

#[test]
fn check_config_prints_effective_settings() {
    let fx = abc_suite();
    fx.write_config("strategy = \"once\"\n\n[deployment]\nname = \"ds.war\"\n");
    let out = fx.run(&["check-config"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("strategy = \"once\""));
    assert!(text.contains("name = \"ds.war\""));
}

#[test]
fn check_config_rejects_unknown_keys() {
    let fx = abc_suite();
    fx.write_config("strategy = \"once\"\nbogus = 1\n");
    let out = fx.run(&["check-config"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("bogus"));
}
