mod common;

use common::{provider, shared};
use pilot_engine::crew::{CrewConfig, CrewManager};
use pilot_engine::planner::Planner;
use pilot_engine::runner::{self, RunRecord, Runner, RunnerError};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const PASSING: &str = "name: Home\nsteps:\n  - goto: https://x.com/home\n  - assert_url_contains: home\n";
const FAILING: &str = "name: Dashboard\nsteps:\n  - goto: https://x.com/home\n  - assert_url_contains: dashboard\n";
const INVALID: &str = "name: Broken\nsteps:\n  - goto: https://x.com\n    click:\n      text: Go\n";

fn runner(state: &common::Shared, max_parallel: usize) -> Runner {
    let crew = CrewManager::new(Planner::default(), provider(state), CrewConfig::default());
    Runner::new(Arc::new(crew), max_parallel)
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

#[tokio::test]
async fn test_run_single_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "home.yaml", PASSING);

    let state = shared();
    let records = runner(&state, 1)
        .run_path(&dir.path().join("home.yaml"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert!(records[0].passed());
    assert_eq!(records[0].status_str(), "passed");
    assert_eq!(runner::exit_code(&records), 0);
}

#[tokio::test]
async fn test_run_directory() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a_home.yaml", PASSING);
    write(dir.path(), "b_dashboard.yml", FAILING);
    write(dir.path(), "c_broken.yaml", INVALID);
    write(dir.path(), "readme.txt", "not a scenario");

    let state = shared();
    let records = runner(&state, 2)
        .run_path(dir.path(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].status_str(), "passed");
    // the failing assertion is skipped, leaving one of two steps passed
    assert_eq!(records[1].status_str(), "partially_failed");
    match &records[2] {
        RunRecord::Failed {
            status,
            scenario_path,
            errors,
        } => {
            assert_eq!(status.as_str(), "validation_failed");
            assert!(scenario_path.ends_with("c_broken.yaml"));
            assert!(errors[0].contains("more than one action"));
        }
        other => panic!("expected a failed record, got {:?}", other),
    }
    assert_eq!(runner::exit_code(&records), 1);

    // one independent session per executed scenario
    let state = state.lock().unwrap();
    assert_eq!(state.launches, 2);
    assert_eq!(state.closes, 2);
}

#[tokio::test]
async fn test_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let state = shared();
    let err = runner(&state, 1)
        .run_path(dir.path(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::NoScenarios(_)));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "home.yaml", PASSING);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let state = shared();
    let records = runner(&state, 1).run_path(dir.path(), cancel).await.unwrap();

    assert!(records[0].is_cancelled());
    assert_eq!(state.lock().unwrap().launches, 0);
}

#[tokio::test]
async fn test_write_output_json_array() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "home.yaml", PASSING);
    write(dir.path(), "broken.yaml", INVALID);

    let state = shared();
    let records = runner(&state, 1)
        .run_path(dir.path(), CancellationToken::new())
        .await
        .unwrap();

    let out = dir.path().join("results").join("run.json");
    runner::write_output(&out, &records).await.unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let array = json.as_array().unwrap();
    assert_eq!(array.len(), 2);
    assert_eq!(array[0]["status"], "validation_failed");
    assert_eq!(array[1]["summary"]["overall_status"], "passed");
    assert_eq!(array[1]["metadata"]["scenario_name"], "Home");
}
