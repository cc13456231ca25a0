#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use k8s_openapi::api::authentication::v1::UserInfo;
use kapp_admission::{
    AdmissionAction, AdmissionCapabilities, AdmissionCapability, AdmissionHooks, AdmissionOperation,
    AdmissionRequest, AdmissionTranslator, Attributes, AttributesRecord, MutatingResponse, Operation,
    UnimplementedPolicy,
};
use kapp_core::{KappError, KappResult, RequestContext, Resource, ResourceKind};
use rustc_hash::FxHashMap;

fn kind() -> ResourceKind {
    ResourceKind::new("inventory.kapp.dev", "v1", "Item")
}

fn item(qty: i64) -> Resource {
    Resource::new(&kind(), Some("default"), "inv-1").with_spec(serde_json::json!({ "quantity": qty }))
}

fn attrs(op: Operation, obj: Option<Resource>) -> AttributesRecord {
    let rec = AttributesRecord::new(op, kind(), Some("default"), "inv-1");
    match obj {
        Some(o) => rec.with_object(o),
        None => rec,
    }
}

/// App with neither hook.
struct Bare;

#[async_trait::async_trait]
impl AdmissionHooks for Bare {}

/// Sets a label and doubles the quantity; rejects negatives.
#[derive(Default)]
struct Labeler {
    seen: Mutex<Vec<AdmissionRequest>>,
}

#[async_trait::async_trait]
impl AdmissionHooks for Labeler {
    async fn mutate(&self, _ctx: &RequestContext, req: &AdmissionRequest) -> KappResult<MutatingResponse> {
        self.seen.lock().unwrap().push(req.clone());
        let mut obj = req.object.clone().ok_or_else(|| KappError::invalid("no object"))?;
        let qty = obj.spec["quantity"].as_i64().unwrap_or(0);
        obj.spec["quantity"] = serde_json::json!(qty * 2);
        Ok(MutatingResponse::updated(obj.with_label("inventory.kapp.dev/managed", "true")))
    }

    async fn validate(&self, _ctx: &RequestContext, req: &AdmissionRequest) -> KappResult<()> {
        let qty = req.object.as_ref().and_then(|o| o.spec["quantity"].as_i64()).unwrap_or(0);
        if qty < 0 {
            return Err(KappError::invalid("quantity must not be negative"));
        }
        Ok(())
    }
}

/// Claims success but returns nothing.
struct Empty;

#[async_trait::async_trait]
impl AdmissionHooks for Empty {
    async fn mutate(&self, _ctx: &RequestContext, _req: &AdmissionRequest) -> KappResult<MutatingResponse> {
        Ok(MutatingResponse::default())
    }
}

#[tokio::test]
async fn missing_hook_leaves_object_unchanged() {
    let t = AdmissionTranslator::new(Arc::new(Bare));
    let ctx = RequestContext::new();
    let mut a = attrs(Operation::Create, Some(item(3)));
    t.mutate(&ctx, &mut a).await.unwrap();
    assert_eq!(a.object, Some(item(3)));
    t.validate(&ctx, &a).await.unwrap();
}

#[tokio::test]
async fn mutation_overwrites_host_object() {
    let t = AdmissionTranslator::new(Arc::new(Labeler::default()));
    let mut a = attrs(Operation::Update, Some(item(3))).with_old_object(item(1));
    t.mutate(&RequestContext::new(), &mut a).await.unwrap();

    let held = a.object().unwrap();
    assert_eq!(held.spec["quantity"], 6);
    assert_eq!(held.labels().unwrap()["inventory.kapp.dev/managed"], "true");
    assert_eq!(held.name(), "inv-1");
}

#[tokio::test]
async fn hook_errors_propagate_unchanged() {
    let t = AdmissionTranslator::new(Arc::new(Labeler::default()));
    let a = attrs(Operation::Create, Some(item(-1)));
    let err = t.validate(&RequestContext::new(), &a).await.unwrap_err();
    assert_eq!(err, KappError::invalid("quantity must not be negative"));

    let mut none = attrs(Operation::Create, None);
    let err = t.mutate(&RequestContext::new(), &mut none).await.unwrap_err();
    assert_eq!(err, KappError::invalid("no object"));
}

#[tokio::test]
async fn missing_updated_object_is_internal() {
    let t = AdmissionTranslator::new(Arc::new(Empty));
    let mut a = attrs(Operation::Create, Some(item(1)));
    let err = t.mutate(&RequestContext::new(), &mut a).await.unwrap_err();
    assert!(matches!(err, KappError::Internal(_)));
    assert_eq!(a.object, Some(item(1)));
}

#[tokio::test]
async fn missing_host_object_is_internal() {
    struct Fixed;
    #[async_trait::async_trait]
    impl AdmissionHooks for Fixed {
        async fn mutate(&self, _ctx: &RequestContext, _req: &AdmissionRequest) -> KappResult<MutatingResponse> {
            Ok(MutatingResponse::updated(item(9)))
        }
    }
    let t = AdmissionTranslator::new(Arc::new(Fixed));
    let mut a = attrs(Operation::Delete, None);
    let err = t.mutate(&RequestContext::new(), &mut a).await.unwrap_err();
    assert!(matches!(err, KappError::Internal(_)));
}

#[tokio::test]
async fn deny_policy_rejects_missing_hooks() {
    let t = AdmissionTranslator::new(Arc::new(Bare)).with_policy(UnimplementedPolicy::Deny);
    let mut a = attrs(Operation::Create, Some(item(1)));
    let err = t.mutate(&RequestContext::new(), &mut a).await.unwrap_err();
    assert!(matches!(err, KappError::InvalidArgument(ref m) if m.contains("forbidden")), "{:?}", err);
    assert!(t.validate(&RequestContext::new(), &a).await.is_err());
}

#[tokio::test]
async fn request_copies_operation_and_identity() {
    let mut extra = BTreeMap::new();
    extra.insert("scopes.example.io".to_string(), vec!["read".to_string(), "write".to_string()]);
    let user = UserInfo {
        username: Some("jane".into()),
        uid: Some("u-1".into()),
        groups: Some(vec!["admins".into()]),
        extra: Some(extra.clone()),
    };
    for (op, action) in [
        (Operation::Create, AdmissionAction::Create),
        (Operation::Update, AdmissionAction::Update),
        (Operation::Delete, AdmissionAction::Delete),
        (Operation::Connect, AdmissionAction::Connect),
    ] {
        let a = attrs(op, Some(item(1))).with_user(user.clone()).with_subresource("status").dry_run();
        let req = AdmissionTranslator::request_from(&a);
        assert_eq!(req.action, action);
        assert_eq!(req.user_info.username, "jane");
        assert_eq!(req.user_info.uid, "u-1");
        assert_eq!(req.user_info.groups, vec!["admins".to_string()]);
        assert_eq!(req.user_info.extra, extra);
        assert_eq!(req.group, "inventory.kapp.dev");
        assert_eq!(req.plural, "items");
        assert_eq!(req.subresource, "status");
        assert!(req.dry_run);
    }
}

#[tokio::test]
async fn capabilities_gate_hook_calls() {
    let hooks = Arc::new(Labeler::default());
    let mut caps = FxHashMap::default();
    caps.insert(
        kind().gvk_key(),
        AdmissionCapabilities {
            mutation: Some(AdmissionCapability { operations: vec![AdmissionOperation::Create] }),
            validation: None,
        },
    );
    let t = AdmissionTranslator::new(hooks.clone()).with_capabilities(caps);
    let ctx = RequestContext::new();

    let mut update = attrs(Operation::Update, Some(item(2)));
    t.mutate(&ctx, &mut update).await.unwrap();
    assert_eq!(update.object, Some(item(2)));
    assert!(hooks.seen.lock().unwrap().is_empty());

    let mut create = attrs(Operation::Create, Some(item(2)));
    t.mutate(&ctx, &mut create).await.unwrap();
    assert_eq!(create.object().unwrap().spec["quantity"], 4);
    assert_eq!(hooks.seen.lock().unwrap().len(), 1);

    // validation was not declared, so even a negative quantity passes
    t.validate(&ctx, &attrs(Operation::Create, Some(item(-5)))).await.unwrap();

    let mut other = AttributesRecord::new(Operation::Create, ResourceKind::new("x", "v1", "Other"), None, "o")
        .with_object(Resource::default());
    t.mutate(&ctx, &mut other).await.unwrap();
    assert_eq!(hooks.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn cancelled_context_short_circuits() {
    let t = AdmissionTranslator::new(Arc::new(Labeler::default()));
    let ctx = RequestContext::new();
    ctx.cancel();
    let mut a = attrs(Operation::Create, Some(item(1)));
    assert!(matches!(t.mutate(&ctx, &mut a).await, Err(KappError::Cancelled(_))));
}
