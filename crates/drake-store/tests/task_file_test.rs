use drake_store::task_file::{get_ready_tasks, list_task_files, TaskFile};
use drake_test_utils::ProjectFixture;

#[test]
fn loads_and_lists_task_files_across_areas() {
    let fixture = ProjectFixture::new();
    fixture.write_task_file("backend", "- [ ] T-001: Set up schema\n  - status: unassigned\n");
    fixture.write_task_file("frontend", "- [ ] T-101: Build form\n  - status: unassigned\n  - depends on: T-001\n");

    let files = list_task_files(fixture.root()).unwrap();
    assert_eq!(files.len(), 2);

    let loaded: Vec<TaskFile> = files.into_iter().map(TaskFile::load).collect::<Result<_, _>>().unwrap();
    let all_tasks: Vec<_> = loaded.iter().flat_map(|f| f.tasks.clone()).collect();

    let ready = get_ready_tasks(&all_tasks);
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id, "T-001");
}

#[test]
fn save_then_reload_preserves_status_change() {
    let fixture = ProjectFixture::new();
    let path = fixture.write_task_file("backend", "- [ ] T-001: Set up schema\n  - status: unassigned\n");
    let mut file = TaskFile::load(&path).unwrap();
    file.find_mut("T-001").unwrap().status = drake_store::TaskStatus::Done;
    file.save().unwrap();

    let reloaded = TaskFile::load(&path).unwrap();
    assert_eq!(reloaded.find("T-001").unwrap().status, drake_store::TaskStatus::Done);
}
