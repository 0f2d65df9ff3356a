mod support;

use std::collections::HashSet;

use pilot_tasks::storage::Storage;
use pilot_tasks::task::{NewTask, Task, TaskStatus, TaskUpdate};
use pilot_tasks::task_log::TaskLog;
use support::TestProject;

fn log_for(project: &TestProject) -> TaskLog {
    TaskLog::new(Storage::new(project.path()), 1000)
}

fn task(id: &str, title: &str) -> Task {
    Task::create(id.to_string(), NewTask::new(title), pilot_tasks::task::now()).expect("task")
}

#[test]
fn repeated_appends_fold_to_last_record() {
    let project = TestProject::new();
    let log = log_for(&project);

    let mut latest = task("a", "v0");
    log.append(&latest).expect("append");
    for round in 1..=5 {
        latest
            .apply_update(
                TaskUpdate {
                    title: Some(format!("v{round}")),
                    ..TaskUpdate::default()
                },
                pilot_tasks::task::now(),
            )
            .expect("update");
        log.append(&latest).expect("append");
    }
    log.append(&task("b", "other")).expect("append");

    let tasks = log.read_all();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0], latest);
    assert_eq!(project.read_log().lines().count(), 7);
}

#[test]
fn compact_then_read_returns_same_tasks() {
    let project = TestProject::new();
    let log = log_for(&project);

    let mut done = task("done", "Finished");
    done.apply_update(TaskUpdate::status(TaskStatus::Done), pilot_tasks::task::now())
        .expect("close");
    let tasks = vec![task("a", "A"), done, task("c", "C")];
    for task in &tasks {
        log.append(task).expect("append");
        log.append(task).expect("append twice");
    }

    log.compact(&tasks).expect("compact");
    let reread = log.read_all();

    let ids = |items: &[Task]| items.iter().map(|t| t.id.clone()).collect::<HashSet<_>>();
    assert_eq!(ids(&reread), ids(&tasks));
    for original in &tasks {
        assert!(reread.contains(original));
    }
    assert_eq!(project.read_log().lines().count(), 3);
}

#[test]
fn compact_leaves_no_temp_files() {
    let project = TestProject::new();
    let log = log_for(&project);
    log.compact(&[task("a", "A")]).expect("compact");

    let names: Vec<String> = std::fs::read_dir(project.tasks_dir())
        .expect("tasks dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name != "tasks.lock")
        .collect();
    assert_eq!(names, vec!["tasks.jsonl".to_string()]);
}

#[test]
fn unreadable_log_reads_empty() {
    let project = TestProject::new();
    std::fs::create_dir_all(project.log_path()).expect("directory in place of the log");
    let log = log_for(&project);
    assert!(log.read_all().is_empty());
}
