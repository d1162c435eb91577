mod support;

use predicates::str::contains;

use support::{json_stdout, TestRoot};

#[test]
fn tagsync_help_works() {
    TestRoot::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("tag"));
}

#[test]
fn subcommand_help_works() {
    let root = TestRoot::new();
    for cmd in ["init", "task", "tag", "changes"] {
        root.cmd().arg(cmd).arg("--help").assert().success();
    }
}

#[test]
fn commands_before_init_are_user_errors() {
    let root = TestRoot::new();
    root.cmd()
        .args(["tag", "list"])
        .assert()
        .code(2)
        .stderr(contains("tagsync init"));
}

#[test]
fn init_creates_store_and_config() {
    let root = TestRoot::new();
    let output = root
        .cmd()
        .args(["--json", "init"])
        .output()
        .expect("run init");
    assert!(output.status.success());
    let json = json_stdout(&output);
    assert_eq!(json["schema_version"], "tagsync.v1");
    assert_eq!(json["data"]["config_created"], true);
    assert!(root.store_dir().exists());
    assert!(root.path().join(".tagsync.toml").exists());

    let again = root
        .cmd()
        .args(["--json", "init"])
        .output()
        .expect("run init again");
    assert_eq!(json_stdout(&again)["data"]["config_created"], false);
}

#[test]
fn task_add_with_tags_then_set_and_show() {
    let root = TestRoot::new();
    root.cmd().arg("init").assert().success();

    let added = root
        .cmd()
        .args(["--json", "task", "add", "Buy milk", "--tag", "Home", "--tag", "urgent"])
        .output()
        .expect("task add");
    assert!(added.status.success());
    let added = json_stdout(&added);
    assert_eq!(added["data"]["tags"], serde_json::json!(["Home", "urgent"]));
    let id = added["data"]["task"]["id"].as_i64().expect("task id").to_string();

    let set = root
        .cmd()
        .args(["--json", "tag", "set", &id, "errand", "URGENT"])
        .output()
        .expect("tag set");
    let set = json_stdout(&set);
    assert_eq!(set["data"]["sync"]["unchanged"], 1);
    assert_eq!(set["data"]["sync"]["created"], serde_json::json!(["errand"]));

    let shown = root
        .cmd()
        .args(["--json", "tag", "show", &id])
        .output()
        .expect("tag show");
    let names: Vec<String> = json_stdout(&shown)["data"]["tags"]
        .as_array()
        .expect("tags array")
        .iter()
        .map(|tag| tag["name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["errand", "urgent"]);
}

#[test]
fn grouped_and_changes_report_counts() {
    let root = TestRoot::new();
    root.cmd().arg("init").assert().success();
    root.cmd()
        .args(["task", "add", "one", "--tag", "work"])
        .assert()
        .success();
    root.cmd()
        .args(["task", "add", "two", "--tag", "work", "--tag", "home"])
        .assert()
        .success();

    let grouped = root
        .cmd()
        .args(["--json", "tag", "grouped"])
        .output()
        .expect("grouped");
    let grouped = json_stdout(&grouped);
    assert_eq!(grouped["data"]["order"], "count_desc");
    assert_eq!(grouped["data"]["tags"][0]["tag"]["name"], "work");
    assert_eq!(grouped["data"]["tags"][0]["count"], 2);

    let changes = root
        .cmd()
        .args(["--json", "changes", "--limit", "2"])
        .output()
        .expect("changes");
    let changes = json_stdout(&changes);
    // Two tag rows and three link rows.
    assert_eq!(changes["data"]["total"], 5);
    assert_eq!(changes["data"]["changes"].as_array().map(Vec::len), Some(2));
}

#[test]
fn grouped_rejects_unknown_order() {
    let root = TestRoot::new();
    root.cmd().arg("init").assert().success();
    root.cmd()
        .args(["tag", "grouped", "--order", "sideways"])
        .assert()
        .code(2)
        .stderr(contains("unknown order"));
}

#[test]
fn remove_and_rename_by_name() {
    let root = TestRoot::new();
    root.cmd().arg("init").assert().success();
    root.cmd()
        .args(["task", "add", "one", "--tag", "Home", "--tag", "work"])
        .assert()
        .success();

    root.cmd()
        .args(["tag", "remove", "1", "work", "nope"])
        .assert()
        .success()
        .stdout(contains("unknown tag: nope"));

    root.cmd()
        .args(["tag", "rename", "home", "House"])
        .assert()
        .success();

    root.cmd()
        .args(["tag", "case", "HOUSE"])
        .assert()
        .success()
        .stdout(contains("House"));

    root.cmd()
        .args(["task", "list", "--untagged"])
        .assert()
        .success()
        .stdout(contains("0 task(s)"));
}

#[test]
fn unknown_task_is_a_user_error() {
    let root = TestRoot::new();
    root.cmd().arg("init").assert().success();
    let output = root
        .cmd()
        .args(["--json", "tag", "show", "42"])
        .output()
        .expect("tag show");
    assert_eq!(output.status.code(), Some(2));
    let json = json_stdout(&output);
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"]["kind"], "user_error");
}

#[test]
fn palette_works_without_a_store() {
    let root = TestRoot::new();
    root.cmd()
        .args(["tag", "palette", "home"])
        .assert()
        .success()
        .stdout(contains("(3)"));
}
