//! Ctrl+C delivered to the process after the grace period.
//!
//! Runs as its own test binary: the signal goes to the whole process.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use rehome::config::{Config, RunMode};
use rehome::context::Context;
use rehome::engine::{Confirmation, Decision, GraceDelay, RunController, RunOutcome, RunPlan};
use rehome::store::backends::memory::MemoryStore;
use rehome::store::fields_from;
use rehome::FromRef;
use serde_json::json;

fn send_sigint() {
    let status = std::process::Command::new("kill")
        .args(["-INT", &std::process::id().to_string()])
        .status()
        .expect("kill runs");
    assert!(status.success());
}

#[tokio::test]
async fn test_ctrl_c_after_grace_stops_the_run() {
    let plan = RunPlan {
        mode: RunMode::Commit,
        purge_source: true,
        collections: vec!["widgets".into()],
        grace: Duration::from_millis(100),
    };
    assert_eq!(GraceDelay.confirm(&plan).await, Decision::Proceed);

    let store = Arc::new(MemoryStore::new());
    store
        .insert("widgets/w1", fields_from(json!({"ownerRef": "AAAAAAAAAAAAAAAAAAAA"})))
        .unwrap();

    let mut config = Config::default();
    config.run.mode = RunMode::Commit;
    config.run.purge_source = true;
    config.run.collections = vec!["widgets".into()];
    config.run.candidate_owner_fields = vec!["ownerRef".into()];
    config.validate().unwrap();
    let ctx = Context::new(store.clone(), config);

    let listener = ctx.interrupt.listen();
    tokio::time::sleep(Duration::from_millis(50)).await;
    send_sigint();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !ctx.interrupt.is_raised() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Ctrl+C after the grace period is observed");
    drop(listener);

    let RunOutcome::Completed(stats) = RunController::from_ref(&ctx)
        .run(&Decision::Proceed)
        .await
        .unwrap()
    else {
        panic!("run aborted");
    };
    assert!(stats.interrupted);
    assert_eq!(store.writes(), 0);
    assert!(store.dump().unwrap().contains_key("widgets/w1"));
}
