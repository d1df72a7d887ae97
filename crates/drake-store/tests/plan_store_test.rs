use drake_store::plan_store::{load_plan, save_plan, Plan};
use drake_test_utils::ProjectFixture;

#[test]
fn plan_persists_progress_across_reload() {
    let fixture = ProjectFixture::new();
    let mut plan = Plan::new("T-001", vec!["write tests".into(), "implement".into(), "commit".into()]);
    plan.mark_step_complete(0);
    save_plan(&fixture.plans_dir(), &plan).unwrap();

    let reloaded = load_plan(&fixture.plans_dir(), "T-001").unwrap().unwrap();
    assert_eq!(reloaded.current_step_index, 1);
    assert_eq!(reloaded.next_step().unwrap().description, "implement");
}

#[test]
fn resumption_reads_back_from_disk_exactly_where_it_left_off() {
    let fixture = ProjectFixture::new();
    let mut plan = Plan::new("T-002", vec!["a".into(), "b".into()]);
    save_plan(&fixture.plans_dir(), &plan).unwrap();
    plan.mark_step_complete(0);
    save_plan(&fixture.plans_dir(), &plan).unwrap();

    let reloaded = load_plan(&fixture.plans_dir(), "T-002").unwrap().unwrap();
    assert_eq!(reloaded.current_step_index, 1);
}
