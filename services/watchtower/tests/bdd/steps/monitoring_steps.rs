//! BDD step definitions for endpoint monitoring

use cucumber::{given, then, when};

use crate::world::{endpoint, parse_status, split_list, WatchtowerWorld};

#[given(expr = "an endpoint {string} with recipients {string}")]
async fn endpoint_with_recipients(world: &mut WatchtowerWorld, id: String, recipients: String) {
    let tower = world.watchtower().await.clone();
    tower
        .upsert_endpoint(endpoint(&id, &split_list(&recipients)))
        .await
        .expect("endpoint should be valid");
}

#[given(expr = "the probe outcomes for {string} are {string}")]
fn probe_outcomes(world: &mut WatchtowerWorld, id: String, outcomes: String) {
    let outcomes = split_list(&outcomes).into_iter().map(|o| match o.as_str() {
        "success" => true,
        "failure" => false,
        other => panic!("Unknown probe outcome: {}", other),
    });
    world.probe.queue(&id, outcomes);
}

#[given(expr = "notifications are disabled for {string}")]
async fn notifications_disabled(world: &mut WatchtowerWorld, id: String) {
    let tower = world.watchtower().await.clone();
    tower.set_notifications(&id, false).await.unwrap();
}

#[when(expr = "{string} is checked {int} times")]
async fn checked_times(world: &mut WatchtowerWorld, id: String, times: usize) {
    let tower = world.watchtower().await.clone();
    for _ in 0..times {
        if let Err(e) = tower.force_check(&id).await {
            world.last_error = Some(e);
            return;
        }
    }
}

#[when(expr = "{string} is put into maintenance")]
async fn put_into_maintenance(world: &mut WatchtowerWorld, id: String) {
    let tower = world.watchtower().await.clone();
    tower.set_maintenance(&id, true).await.unwrap();
}

#[when(expr = "maintenance for {string} is cleared")]
async fn maintenance_cleared(world: &mut WatchtowerWorld, id: String) {
    let tower = world.watchtower().await.clone();
    tower.set_maintenance(&id, false).await.unwrap();
}

#[then(expr = "the status of {string} is {string}")]
async fn status_is(world: &mut WatchtowerWorld, id: String, expected: String) {
    let tower = world.watchtower().await.clone();
    let status = tower.current_status(&id).await.unwrap();
    assert_eq!(status.status, Some(parse_status(&expected)));
}

#[then(expr = "{int} notification(s) was/were sent")]
fn notifications_sent(world: &mut WatchtowerWorld, count: usize) {
    let sent = world.sent();
    assert_eq!(
        sent.len(),
        count,
        "Expected {} notifications, got {:?}",
        count,
        sent
    );
}

#[then(expr = "every notification reports {string} to {string}")]
fn every_notification_reports(world: &mut WatchtowerWorld, previous: String, current: String) {
    let previous = parse_status(&previous);
    let current = parse_status(&current);
    for (recipient, transition) in world.sent() {
        assert_eq!(
            (transition.previous, transition.current),
            (previous, current),
            "Unexpected transition sent to {}",
            recipient
        );
    }
}

#[then(expr = "the uptime of {string} over {int} days is {float} percent")]
async fn uptime_over_days(world: &mut WatchtowerWorld, id: String, days: u32, expected: f64) {
    let tower = world.watchtower().await.clone();
    let uptime = tower.uptime_percent(&id, days).await.unwrap();
    assert_eq!(uptime, expected);
}

#[then(expr = "the request fails with {string}")]
fn request_fails_with(world: &mut WatchtowerWorld, expected: String) {
    let error = world.last_error.as_ref().expect("expected an error");
    assert!(
        error.to_string().contains(&expected),
        "Expected error containing '{}', got '{}'",
        expected,
        error
    );
}
