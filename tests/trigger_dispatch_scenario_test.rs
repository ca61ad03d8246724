//! Scenario E (webhook with a bad signature) and Scenario F (event filter
//! matching), both driven through a SQLite-backed `TriggerRepository` and
//! the pattern catalog rather than the in-memory test doubles already
//! covered by `services::trigger`'s own unit tests.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use conclave::adapters::sqlite::{create_migrated_test_pool, SqliteTriggerRepository};
use conclave::domain::models::trigger::{FilterOperators, FilterValue};
use conclave::domain::models::{Trigger, WorkflowStep};
use conclave::domain::ports::TriggerRepository;
use conclave::services::trigger::webhook::sign;
use conclave::services::trigger::TriggerDispatcher;
use serde_json::json;

use common::{catalog_with_local_provider, pattern, role};

async fn dispatcher_with_pattern(pattern_name: &str) -> (TriggerDispatcher, Arc<dyn TriggerRepository>) {
    let pool = create_migrated_test_pool().await.unwrap();
    let repo: Arc<dyn TriggerRepository> = Arc::new(SqliteTriggerRepository::new(pool));

    let (catalog, _provider) = catalog_with_local_provider();
    let p = pattern(
        pattern_name,
        vec![role("handler", None)],
        vec![],
        vec![WorkflowStep::Assign {
            role: "handler".to_string(),
            task: "handle".to_string(),
            input: None,
        }],
        None,
    );
    catalog.register(p).unwrap();

    let dispatcher = TriggerDispatcher::new(repo.clone(), catalog as Arc<dyn conclave::services::orgchart::PatternExecutor>);
    (dispatcher, repo)
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected_and_does_not_fire() {
    let (dispatcher, repo) = dispatcher_with_pattern("webhook-pattern").await;

    let mut trigger = Trigger::new_webhook("webhook-pattern", true);
    let path = trigger.webhook_path.clone().unwrap();
    dispatcher.register(trigger.clone()).await.unwrap();

    let body = json!({"amount": 42});
    let mut headers = HashMap::new();
    headers.insert("x-parallax-signature".to_string(), "sha256=deadbeef".to_string());

    let result = dispatcher.handle_webhook(&path, &headers, body).await;
    assert!(matches!(result, Err(conclave::services::trigger::WebhookError::Unauthorized)));

    trigger = repo.get(trigger.id).await.unwrap().unwrap();
    assert_eq!(trigger.trigger_count, 0);
}

#[tokio::test]
async fn webhook_with_valid_signature_fires_and_increments_count() {
    let (dispatcher, repo) = dispatcher_with_pattern("webhook-pattern").await;

    let trigger = Trigger::new_webhook("webhook-pattern", true);
    let path = trigger.webhook_path.clone().unwrap();
    let secret = trigger.webhook_secret.clone().unwrap();
    dispatcher.register(trigger.clone()).await.unwrap();

    let body = json!({"amount": 42});
    let raw = serde_json::to_vec(&body).unwrap();
    let signature = sign(&raw, &secret);
    let mut headers = HashMap::new();
    headers.insert("x-parallax-signature".to_string(), signature);

    dispatcher.handle_webhook(&path, &headers, body).await.unwrap();

    let fetched = repo.get(trigger.id).await.unwrap().unwrap();
    assert_eq!(fetched.trigger_count, 1);
}

#[tokio::test]
async fn event_trigger_fires_only_when_filter_matches() {
    let (dispatcher, repo) = dispatcher_with_pattern("event-pattern").await;

    let mut filter = HashMap::new();
    filter.insert(
        "amount".to_string(),
        FilterValue::Operators(FilterOperators { gte: Some(json!(100)), ..Default::default() }),
    );
    filter.insert(
        "region".to_string(),
        FilterValue::Operators(FilterOperators { r#in: Some(vec![json!("us"), json!("eu")]), ..Default::default() }),
    );

    let trigger = Trigger::new_event("event-pattern", "payment.completed", Some(filter));
    dispatcher.register(trigger.clone()).await.unwrap();
    dispatcher.load().await.unwrap();

    let below_threshold = json!({"amount": 50, "region": "us"});
    let results = dispatcher.emit_event("payment.completed", below_threshold).await;
    assert!(results.is_empty());

    let wrong_region = json!({"amount": 500, "region": "ap"});
    let results = dispatcher.emit_event("payment.completed", wrong_region).await;
    assert!(results.is_empty());

    let matching = json!({"amount": 500, "region": "eu"});
    let results = dispatcher.emit_event("payment.completed", matching).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());

    let fetched = repo.get(trigger.id).await.unwrap().unwrap();
    assert_eq!(fetched.trigger_count, 1);
}
