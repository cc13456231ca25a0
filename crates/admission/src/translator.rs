use std::sync::Arc;

use kapp_core::{KappError, KappResult, RequestContext};
use metrics::counter;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{AdmissionAction, AdmissionCapabilities, AdmissionHooks, AdmissionRequest, Attributes};

/// What to do when an app does not implement a hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnimplementedPolicy {
    /// Treat the missing hook as a successful no-op.
    #[default]
    Allow,
    /// Reject the request.
    Deny,
}

impl UnimplementedPolicy {
    /// `KAPP_ADMISSION_UNIMPLEMENTED=deny` selects [`UnimplementedPolicy::Deny`].
    pub fn from_env() -> Self {
        match std::env::var("KAPP_ADMISSION_UNIMPLEMENTED") {
            Ok(v) if v.eq_ignore_ascii_case("deny") => Self::Deny,
            _ => Self::Allow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Mutate,
    Validate,
}

impl Hook {
    fn as_str(self) -> &'static str {
        match self {
            Hook::Mutate => "mutate",
            Hook::Validate => "validate",
        }
    }
}

/// Bridges host admission attributes to an app's [`AdmissionHooks`].
pub struct AdmissionTranslator {
    hooks: Arc<dyn AdmissionHooks>,
    capabilities: Option<FxHashMap<String, AdmissionCapabilities>>,
    policy: UnimplementedPolicy,
}

impl AdmissionTranslator {
    pub fn new(hooks: Arc<dyn AdmissionHooks>) -> Self {
        Self { hooks, capabilities: None, policy: UnimplementedPolicy::default() }
    }

    /// Only call hooks for operations a kind declares. Keys are
    /// `ResourceKind::gvk_key` values; kinds without an entry are skipped.
    pub fn with_capabilities(mut self, caps: FxHashMap<String, AdmissionCapabilities>) -> Self {
        self.capabilities = Some(caps);
        self
    }

    pub fn with_policy(mut self, policy: UnimplementedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> UnimplementedPolicy {
        self.policy
    }

    pub fn request_from(attrs: &dyn Attributes) -> AdmissionRequest {
        let kind = attrs.kind();
        AdmissionRequest {
            action: attrs.operation().into(),
            kind: kind.kind.clone(),
            group: kind.group.clone(),
            version: kind.version.clone(),
            plural: attrs.resource().to_string(),
            subresource: attrs.subresource().to_string(),
            namespace: attrs.namespace().map(|s| s.to_string()),
            name: attrs.name().to_string(),
            object: attrs.object().cloned(),
            old_object: attrs.old_object().cloned(),
            user_info: attrs.user_info().into(),
            dry_run: attrs.is_dry_run(),
        }
    }

    /// Run the app's mutate hook and write the result over the host's object.
    pub async fn mutate(&self, ctx: &RequestContext, attrs: &mut dyn Attributes) -> KappResult<()> {
        ctx.check("admission mutate")?;
        let req = Self::request_from(&*attrs);
        if !self.declares(Hook::Mutate, attrs.kind().gvk_key(), req.action) {
            self.record(Hook::Mutate, &req, "skipped");
            return Ok(());
        }
        let resp = match self.hooks.mutate(ctx, &req).await {
            Ok(resp) => resp,
            Err(e) if e.is_unimplemented() => return self.unimplemented(Hook::Mutate, &req),
            Err(e) => {
                self.record(Hook::Mutate, &req, "error");
                return Err(e);
            }
        };
        let updated = resp
            .updated_object
            .ok_or_else(|| KappError::internal(format!("mutate {} {}: hook returned no object", req.kind, req.name)))?;
        let obj = attrs
            .object_mut()
            .ok_or_else(|| KappError::internal(format!("mutate {} {}: request carries no object", req.kind, req.name)))?;
        *obj = updated;
        self.record(Hook::Mutate, &req, "ok");
        Ok(())
    }

    /// Run the app's validate hook.
    pub async fn validate(&self, ctx: &RequestContext, attrs: &dyn Attributes) -> KappResult<()> {
        ctx.check("admission validate")?;
        let req = Self::request_from(attrs);
        if !self.declares(Hook::Validate, attrs.kind().gvk_key(), req.action) {
            self.record(Hook::Validate, &req, "skipped");
            return Ok(());
        }
        match self.hooks.validate(ctx, &req).await {
            Ok(()) => {
                self.record(Hook::Validate, &req, "ok");
                Ok(())
            }
            Err(e) if e.is_unimplemented() => self.unimplemented(Hook::Validate, &req),
            Err(e) => {
                self.record(Hook::Validate, &req, "denied");
                Err(e)
            }
        }
    }

    fn declares(&self, hook: Hook, gvk_key: String, action: AdmissionAction) -> bool {
        let Some(caps) = self.capabilities.as_ref() else {
            return true;
        };
        match (caps.get(&gvk_key), hook) {
            (Some(c), Hook::Mutate) => c.mutates(action),
            (Some(c), Hook::Validate) => c.validates(action),
            (None, _) => false,
        }
    }

    fn unimplemented(&self, hook: Hook, req: &AdmissionRequest) -> KappResult<()> {
        match self.policy {
            UnimplementedPolicy::Allow => {
                debug!(hook = hook.as_str(), kind = %req.kind, action = %req.action, "admission: hook not implemented; allowing");
                self.record(hook, req, "unimplemented");
                Ok(())
            }
            UnimplementedPolicy::Deny => {
                warn!(hook = hook.as_str(), kind = %req.kind, action = %req.action, "admission: hook not implemented; denying");
                self.record(hook, req, "denied");
                Err(KappError::invalid(format!(
                    "forbidden: {} {} {}/{}: app does not implement {}",
                    req.action,
                    req.kind,
                    req.namespace.as_deref().unwrap_or(""),
                    req.name,
                    hook.as_str()
                )))
            }
        }
    }

    fn record(&self, hook: Hook, req: &AdmissionRequest, outcome: &'static str) {
        counter!(
            "admission_calls_total",
            1u64,
            "hook" => hook.as_str(),
            "action" => req.action.to_string(),
            "outcome" => outcome
        );
    }
}
