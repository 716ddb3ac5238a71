//! BDD step definitions for the endpoint registry

use cucumber::{then, when};

use crate::world::{endpoint, split_list, WatchtowerWorld};

#[when(expr = "an endpoint {string} with url {string} is added")]
async fn endpoint_with_url_added(world: &mut WatchtowerWorld, id: String, url: String) {
    let tower = world.watchtower().await.clone();
    let mut config = endpoint(&id, &[]);
    config.url = url;
    if let Err(e) = tower.upsert_endpoint(config).await {
        world.last_error = Some(e);
    }
}

#[when(expr = "an endpoint {string} with recipients {string} is added")]
async fn endpoint_with_recipients_added(
    world: &mut WatchtowerWorld,
    id: String,
    recipients: String,
) {
    let tower = world.watchtower().await.clone();
    if let Err(e) = tower
        .upsert_endpoint(endpoint(&id, &split_list(&recipients)))
        .await
    {
        world.last_error = Some(e);
    }
}

#[when(expr = "the endpoint {string} is deleted")]
async fn endpoint_deleted(world: &mut WatchtowerWorld, id: String) {
    let tower = world.watchtower().await.clone();
    tower.delete_endpoint(&id).await.unwrap();
}

#[then(expr = "there are {int} endpoints")]
async fn endpoint_count(world: &mut WatchtowerWorld, count: usize) {
    let tower = world.watchtower().await.clone();
    assert_eq!(tower.registry().list_endpoints().await.len(), count);
}

#[then(expr = "{string} has recipients {string}")]
async fn has_recipients(world: &mut WatchtowerWorld, id: String, recipients: String) {
    let tower = world.watchtower().await.clone();
    let config = tower.registry().get_endpoint(&id).await.unwrap();
    assert_eq!(config.recipients, split_list(&recipients));
}

#[then(expr = "the endpoints are {string}")]
async fn endpoints_are(world: &mut WatchtowerWorld, ids: String) {
    let tower = world.watchtower().await.clone();
    let listed: Vec<String> = tower
        .registry()
        .list_endpoints()
        .await
        .iter()
        .map(|e| e.id.clone())
        .collect();
    assert_eq!(listed, split_list(&ids));
}

#[then(expr = "the summary shows {int} total, {int} up and {int} pending")]
async fn summary_shows(world: &mut WatchtowerWorld, total: usize, up: usize, pending: usize) {
    let tower = world.watchtower().await.clone();
    let summary = tower.summary().await;
    assert_eq!(
        (summary.total, summary.up, summary.pending),
        (total, up, pending)
    );
}
