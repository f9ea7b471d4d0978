use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;

const HOUSEHOLD: &str = r#"{
  "form_id": "household",
  "model_version": 3,
  "root": {
    "name": "data",
    "kind": "group",
    "children": [
      { "name": "name", "kind": "string" },
      { "name": "loc", "kind": "geopoint" },
      {
        "name": "members",
        "kind": "repeat",
        "children": [
          { "name": "age", "kind": "integer" },
          { "name": "photo", "kind": "binary" }
        ]
      },
      { "name": "colors", "kind": "select_n" }
    ]
  }
}"#;

fn tool() -> Command {
    let mut cmd = Command::cargo_bin("submission-tool").expect("binary built");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn workspace() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    dir.child("household.json")
        .write_str(HOUSEHOLD)
        .expect("write definition");
    dir
}

#[test]
fn layout_lists_tables_and_elements() {
    let dir = workspace();
    tool()
        .arg("layout")
        .arg(dir.child("household.json").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("household (model 3, ui null)"))
        .stdout(predicate::str::contains("submissions.HOUSEHOLD_CORE"))
        .stdout(predicate::str::contains("top_level"))
        .stdout(predicate::str::contains("long_string"))
        .stdout(predicate::str::contains("household/data/members/age"));
}

#[test]
fn layout_json_is_machine_readable() {
    let dir = workspace();
    let output = tool()
        .arg("layout")
        .arg(dir.child("household.json").path())
        .arg("--json")
        .output()
        .expect("run layout");
    assert!(output.status.success());
    let layout: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json layout");
    assert_eq!(layout["form_id"], "household");
    assert_eq!(layout["version"]["model_version"], 3);
    assert!(layout["schema"].is_object());
}

#[test]
fn layout_honors_a_limits_file() {
    let dir = workspace();
    dir.child("limits.toml")
        .write_str("schema = \"field_data\"\n")
        .expect("write limits");
    tool()
        .arg("layout")
        .arg(dir.child("household.json").path())
        .arg("--limits")
        .arg(dir.child("limits.toml").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("field_data.HOUSEHOLD_CORE"));

    dir.child("zero.toml")
        .write_str("max_columns_per_table = 0\n")
        .expect("write limits");
    tool()
        .arg("layout")
        .arg(dir.child("household.json").path())
        .arg("--limits")
        .arg(dir.child("zero.toml").path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_columns_per_table"));
}

#[test]
fn layout_rejects_a_leaf_root() {
    let dir = TempDir::new().expect("temp dir");
    dir.child("broken.json")
        .write_str(r#"{ "form_id": "broken", "root": { "name": "data", "kind": "string" } }"#)
        .expect("write definition");
    tool()
        .arg("layout")
        .arg(dir.child("broken.json").path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to compile"));
}

#[test]
fn key_parse_reports_segments() {
    tool()
        .args([
            "key",
            "parse",
            "household[@version=3 and @uiVersion=null]/data[@key=uuid:h1]/members[@ordinal=2]/age",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"element_name\": \"members\""))
        .stdout(predicate::str::contains("\"ordinal\": 2"))
        .stdout(predicate::str::contains("\"auri\": \"uuid:h1\""));

    tool()
        .args(["key", "parse", "household/data"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot parse"));
}

#[test]
fn key_build_renders_missing_versions_as_null() {
    tool()
        .args([
            "key",
            "build",
            "household",
            "--instance",
            "uuid:h1",
            "--model-version",
            "3",
        ])
        .assert()
        .success()
        .stdout("household[@version=3 and @uiVersion=null]/data[@key=uuid:h1]\n");
}

#[test]
fn schema_describes_form_definitions() {
    tool()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("form_id"))
        .stdout(predicate::str::contains("select_n"));
    tool()
        .args(["schema", "--limits"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_columns_per_table"));
}

#[test]
fn submit_persists_one_submission() {
    let dir = workspace();
    tool()
        .arg("submit")
        .arg(dir.child("household.json").path())
        .args([
            "--instance-id",
            "uuid:cli-1",
            "--value",
            "name=Ada Lovelace",
            "--value",
            "loc=1.5 -2.25",
            "--value",
            "colors=red blue",
            "--complete",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "household[@version=3 and @uiVersion=null]/data[@key=uuid:cli-1]",
        ))
        .stdout(predicate::str::is_match(r"HOUSEHOLD_CORE\s+rows=1").expect("regex"))
        .stdout(predicate::str::is_match(r"rows=2").expect("regex"));
}

#[test]
fn submit_rejects_unknown_elements_and_bad_values() {
    let dir = workspace();
    tool()
        .arg("submit")
        .arg(dir.child("household.json").path())
        .args(["--value", "height=2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no element `height`"));
    tool()
        .arg("submit")
        .arg(dir.child("household.json").path())
        .args(["--value", "loc=north"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value for `loc`"));
    tool()
        .arg("submit")
        .arg(dir.child("household.json").path())
        .args(["--value", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NAME=VALUE"));
}
