mod support;

use pilot_tasks::config::Config;
use support::TestProject;

#[test]
fn missing_config_uses_defaults() {
    let project = TestProject::new();
    let cfg = Config::load_from_project(project.path());
    assert_eq!(cfg.board.id_prefix, "task");
    assert!(cfg.board.watch);
    assert_eq!(cfg.board.debounce_ms, 200);
    assert_eq!(cfg.board.lock_timeout_ms, 5000);
}

#[test]
fn partial_config_overrides_only_given_keys() {
    let project = TestProject::new();
    project
        .write_config("[board]\nid_prefix = \"pilot\"\ndebounce_ms = 50\n")
        .expect("write config");

    let cfg = Config::load_from_project(project.path());
    assert_eq!(cfg.board.id_prefix, "pilot");
    assert_eq!(cfg.board.debounce_ms, 50);
    assert!(cfg.board.watch);
}

#[test]
fn invalid_config_falls_back_to_defaults() {
    let project = TestProject::new();
    project
        .write_config("[board]\nid_prefix = \"has space\"\n")
        .expect("write config");
    let cfg = Config::load_from_project(project.path());
    assert_eq!(cfg.board.id_prefix, "task");

    let path = project
        .write_config("[board]\ndebounce_ms = \"soon\"\n")
        .expect("write config");
    assert!(Config::load(&path).is_err());
    assert_eq!(Config::load_from_project(project.path()).board.debounce_ms, 200);
}

#[test]
fn configured_prefix_names_new_tasks() {
    let project = TestProject::new();
    project
        .write_config("[board]\nid_prefix = \"pilot\"\nwatch = false\n")
        .expect("write config");

    let manager = pilot_tasks::BoardManager::new(Config::load_from_project(project.path()));
    let task = manager
        .create_task(project.path(), pilot_tasks::task::NewTask::new("A"))
        .expect("create");
    assert!(task.id.starts_with("pilot-"));
}
