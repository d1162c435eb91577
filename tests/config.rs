mod support;

use tagsync::config::Config;
use tagsync::query::TagOrder;
use tagsync::Error;

use support::TestRoot;

#[test]
fn load_from_root_defaults_when_missing() {
    let root = TestRoot::new();
    let cfg = Config::load_from_root(root.path());
    assert_eq!(cfg.store.dir, ".tagsync");
    assert!(cfg.store.record_changes);
    assert_eq!(cfg.tags.default_order, TagOrder::CountDesc);
}

#[test]
fn load_from_root_defaults_on_invalid_config() {
    let root = TestRoot::new();
    root.write_config("[store]\nlock_timeout_ms = 0\n")
        .expect("write config");
    let cfg = Config::load_from_root(root.path());
    assert_eq!(cfg.store.lock_timeout_ms, 5000);
}

#[test]
fn load_rejects_empty_store_dir() {
    let root = TestRoot::new();
    let path = root.write_config("[store]\ndir = \"  \"\n").expect("write config");
    assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));
}

#[test]
fn tag_order_and_hidden_flag_parse() {
    let root = TestRoot::new();
    let path = root
        .write_config("[tags]\ndefault_order = \"name_asc\"\ninclude_hidden = true\n")
        .expect("write config");
    let cfg = Config::load(&path).expect("load");
    assert_eq!(cfg.tags.default_order, TagOrder::NameAsc);
    assert!(cfg.tags.include_hidden);
}

#[test]
fn disabled_change_recording_leaves_log_empty() {
    let root = TestRoot::new();
    root.write_config("[store]\nrecord_changes = false\n")
        .expect("write config");
    root.cmd().arg("init").assert().success();
    root.cmd()
        .args(["task", "add", "one", "--tag", "work"])
        .assert()
        .success();

    let output = root
        .cmd()
        .args(["--json", "changes"])
        .output()
        .expect("changes");
    let json = support::json_stdout(&output);
    assert_eq!(json["data"]["total"], 0);
}
