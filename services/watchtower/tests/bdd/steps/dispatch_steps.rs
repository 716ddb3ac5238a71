//! BDD step definitions for notification dispatch

use cucumber::{given, then, when};

use watchtower::config::NotificationConfig;
use watchtower::dispatcher::Dispatcher;
use watchtower::state::new_state_handle;
use watchtower::StatusTransition;

use crate::world::{parse_status, WatchtowerWorld};

#[given(expr = "deliveries to {string} fail")]
fn deliveries_fail(world: &mut WatchtowerWorld, recipient: String) {
    world.notifier.failing.lock().unwrap().insert(recipient);
}

#[when(expr = "the transition {string} to {string} for {string} is dispatched twice")]
async fn dispatched_twice(
    world: &mut WatchtowerWorld,
    previous: String,
    current: String,
    id: String,
) {
    let tower = world.watchtower().await.clone();
    let endpoint = tower.registry().get_endpoint(&id).await.unwrap();
    let dispatcher = Dispatcher::new(
        world.notifier.clone(),
        &NotificationConfig::default(),
        30,
        new_state_handle(30),
    );
    let transition = StatusTransition {
        endpoint_id: id,
        previous: parse_status(&previous),
        current: parse_status(&current),
        timestamp_epoch_ms: watchtower::current_epoch_ms(),
    };

    for _ in 0..2 {
        let records = dispatcher.on_transition(&transition, &endpoint).await;
        world.records.extend(records);
    }
}

#[then(expr = "the delivery to {string} failed permanently after {int} attempts")]
async fn delivery_failed_permanently(world: &mut WatchtowerWorld, recipient: String, attempts: u32) {
    let tower = world.watchtower().await.clone();
    let records = tower.recent_notifications(1).await;
    let record = records
        .iter()
        .find(|r| r.recipient == recipient)
        .expect("no record for recipient");
    assert!(!record.success);
    assert!(record.permanent);
    assert_eq!(record.attempts, attempts);
    assert!(record.error.is_some());
}

#[then(expr = "the delivery to {string} succeeded")]
async fn delivery_succeeded(world: &mut WatchtowerWorld, recipient: String) {
    let tower = world.watchtower().await.clone();
    let records = tower.recent_notifications(1).await;
    let record = records
        .iter()
        .find(|r| r.recipient == recipient)
        .expect("no record for recipient");
    assert!(record.success);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.message, "Endpoint is down");
}
