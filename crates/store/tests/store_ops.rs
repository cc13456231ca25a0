#![forbid(unsafe_code)]

use kapp_core::{KappError, RequestContext, Resource, ResourceKind};
use kapp_store::{ListOptions, ResourceStore, StoreConfig, UpdateOptions};

fn kind() -> ResourceKind {
    ResourceKind::new("inventory.kapp.dev", "v1", "Item")
}

fn store() -> ResourceStore {
    ResourceStore::new(kind(), StoreConfig::default())
}

fn item(name: &str, qty: i64) -> Resource {
    Resource::new(&kind(), Some("default"), name).with_spec(serde_json::json!({ "quantity": qty }))
}

#[tokio::test]
async fn create_then_get_starts_at_version_one() {
    let s = store();
    let ctx = RequestContext::new();
    s.create(&ctx, item("inv-1", 3)).await.unwrap();

    let got = s.get(&ctx, Some("default"), "inv-1").await.unwrap();
    assert_eq!(got.resource_version(), Some("1"));
    assert_eq!(got.generation(), Some(1));
    assert!(got.metadata.uid.is_some());
    assert!(got.metadata.creation_timestamp.is_some());
    assert_eq!(got.kind(), Some("Item"));
    assert_eq!(got.api_version(), Some("inventory.kapp.dev/v1"));
}

#[tokio::test]
async fn duplicate_create_fails() {
    let s = store();
    let ctx = RequestContext::new();
    s.create(&ctx, item("inv-1", 1)).await.unwrap();
    let err = s.create(&ctx, item("inv-1", 2)).await.unwrap_err();
    assert!(matches!(err, KappError::AlreadyExists(_)), "{:?}", err);
    assert_eq!(s.current_version(), 1);
}

#[tokio::test]
async fn create_requires_name() {
    let s = store();
    let err = s.create(&RequestContext::new(), item("", 1)).await.unwrap_err();
    assert!(matches!(err, KappError::InvalidArgument(_)));
}

#[tokio::test]
async fn get_missing_is_not_found() {
    let s = store();
    let err = s.get(&RequestContext::new(), Some("default"), "nope").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn get_returns_a_copy() {
    let s = store();
    let ctx = RequestContext::new();
    s.create(&ctx, item("inv-1", 1)).await.unwrap();
    let mut first = s.get(&ctx, None, "inv-1").await.unwrap();
    first.spec["quantity"] = serde_json::json!(99);
    let second = s.get(&ctx, None, "inv-1").await.unwrap();
    assert_eq!(second.spec["quantity"], 1);
    assert_eq!(second, s.get(&ctx, None, "inv-1").await.unwrap());
}

#[tokio::test]
async fn update_bumps_version_and_generation() {
    let s = store();
    let ctx = RequestContext::new();
    let created = s.create(&ctx, item("inv-1", 1)).await.unwrap();

    let updated = s
        .update(&ctx, Some("default"), "inv-1", UpdateOptions::expecting("1"), |mut obj| {
            obj.spec["quantity"] = serde_json::json!(5);
            Ok(obj)
        })
        .await
        .unwrap();
    assert_eq!(updated.resource_version(), Some("2"));
    assert_eq!(updated.generation(), Some(2));
    assert_eq!(updated.metadata.uid, created.metadata.uid);
    assert_eq!(updated.metadata.creation_timestamp, created.metadata.creation_timestamp);
    assert_eq!(s.get(&ctx, None, "inv-1").await.unwrap().spec["quantity"], 5);
}

#[tokio::test]
async fn stale_update_conflicts() {
    let s = store();
    let ctx = RequestContext::new();
    s.create(&ctx, item("inv-1", 1)).await.unwrap();
    s.update(&ctx, None, "inv-1", UpdateOptions::expecting("1"), Ok).await.unwrap();

    let err = s
        .update(&ctx, None, "inv-1", UpdateOptions::expecting("1"), |mut obj| {
            obj.spec["quantity"] = serde_json::json!(7);
            Ok(obj)
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "{:?}", err);
    let stored = s.get(&ctx, None, "inv-1").await.unwrap();
    assert_eq!(stored.resource_version(), Some("2"));
    assert_eq!(stored.spec["quantity"], 1);
}

#[tokio::test]
async fn update_missing_without_create_is_not_found() {
    let s = store();
    let err = s
        .update(&RequestContext::new(), None, "ghost", UpdateOptions::default(), Ok)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(s.current_version(), 0);
}

#[tokio::test]
async fn update_can_create_when_asked() {
    let s = store();
    let ctx = RequestContext::new();
    let created = s
        .update(&ctx, Some("default"), "fresh", UpdateOptions::default().upsert(), |obj| {
            Ok(obj.with_spec(serde_json::json!({ "quantity": 4 })))
        })
        .await
        .unwrap();
    assert_eq!(created.resource_version(), Some("1"));
    assert_eq!(created.generation(), Some(1));
    assert_eq!(created.namespace(), Some("default"));

    let err = s
        .update(&ctx, None, "other", UpdateOptions::expecting("9").upsert(), Ok)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn update_fn_error_leaves_state_untouched() {
    let s = store();
    let ctx = RequestContext::new();
    s.create(&ctx, item("inv-1", 1)).await.unwrap();
    let err = s
        .update(&ctx, None, "inv-1", UpdateOptions::expecting("1"), |_| Err(KappError::invalid("quantity must be >= 0")))
        .await
        .unwrap_err();
    assert_eq!(err, KappError::invalid("quantity must be >= 0"));
    assert_eq!(s.current_version(), 1);
}

#[tokio::test]
async fn update_cannot_rename() {
    let s = store();
    let ctx = RequestContext::new();
    s.create(&ctx, item("inv-1", 1)).await.unwrap();
    let err = s
        .update(&ctx, None, "inv-1", UpdateOptions::expecting("1"), |mut obj| {
            obj.metadata.name = Some("inv-2".into());
            Ok(obj)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, KappError::InvalidArgument(_)));

    let err = s
        .update(&ctx, None, "inv-1", UpdateOptions::expecting("1"), |mut obj| {
            obj.metadata.namespace = Some("elsewhere".into());
            Ok(obj)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, KappError::InvalidArgument(_)));
}

#[tokio::test]
async fn delete_checks_precondition_and_advances_version() {
    let s = store();
    let ctx = RequestContext::new();
    s.create(&ctx, item("inv-1", 1)).await.unwrap();

    let err = s.delete(&ctx, None, "inv-1", Some("7")).await.unwrap_err();
    assert!(err.is_conflict());

    let removed = s.delete(&ctx, None, "inv-1", Some("1")).await.unwrap();
    assert_eq!(removed.name(), "inv-1");
    assert_eq!(s.current_version(), 2);
    assert!(s.get(&ctx, None, "inv-1").await.unwrap_err().is_not_found());
    assert!(s.delete(&ctx, None, "inv-1", None).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn versions_strictly_increase_across_mutations() {
    let s = store();
    let ctx = RequestContext::new();
    let mut seen = Vec::new();
    for i in 0..4 {
        let obj = s.create(&ctx, item(&format!("inv-{}", i), i)).await.unwrap();
        seen.push(obj.resource_version().unwrap().parse::<u64>().unwrap());
    }
    let upd = s.update(&ctx, None, "inv-0", UpdateOptions::expecting("1"), Ok).await.unwrap();
    seen.push(upd.resource_version().unwrap().parse().unwrap());
    s.delete(&ctx, None, "inv-1", None).await.unwrap();
    seen.push(s.current_version());
    let again = s.create(&ctx, item("inv-1", 1)).await.unwrap();
    seen.push(again.resource_version().unwrap().parse().unwrap());

    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{:?}", seen);
}

#[tokio::test]
async fn version_watch_sees_mutations() {
    let s = store();
    let ctx = RequestContext::new();
    let mut rx = s.subscribe_versions();
    s.create(&ctx, item("inv-1", 1)).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), 1);
}

#[tokio::test]
async fn cancelled_request_does_not_mutate() {
    let s = store();
    let ctx = RequestContext::new();
    ctx.cancel();
    let err = s.create(&ctx, item("inv-1", 1)).await.unwrap_err();
    assert!(matches!(err, KappError::Cancelled(_)));
    assert_eq!(s.current_version(), 0);
    let live = RequestContext::new();
    assert!(s.get(&live, None, "inv-1").await.unwrap_err().is_not_found());
    assert!(matches!(s.list(&ctx, ListOptions::default()).await, Err(KappError::Cancelled(_))));
}
