use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::authentication::v1::UserInfo;
use kapp_core::{KappError, KappResult, RequestContext, Resource};
use serde::{Deserialize, Serialize};

use crate::Operation;

/// Admission action as seen by apps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdmissionAction {
    Create,
    Update,
    Delete,
    Connect,
}

impl From<Operation> for AdmissionAction {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Create => Self::Create,
            Operation::Update => Self::Update,
            Operation::Delete => Self::Delete,
            Operation::Connect => Self::Connect,
        }
    }
}

impl fmt::Display for AdmissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
        })
    }
}

/// Requesting user, copied from the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionUserInfo {
    pub username: String,
    pub uid: String,
    pub groups: Vec<String>,
    pub extra: BTreeMap<String, Vec<String>>,
}

impl From<&UserInfo> for AdmissionUserInfo {
    fn from(u: &UserInfo) -> Self {
        Self {
            username: u.username.clone().unwrap_or_default(),
            uid: u.uid.clone().unwrap_or_default(),
            groups: u.groups.clone().unwrap_or_default(),
            extra: u.extra.clone().unwrap_or_default(),
        }
    }
}

/// One admission call, built fresh for every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub action: AdmissionAction,
    pub kind: String,
    pub group: String,
    pub version: String,
    pub plural: String,
    pub subresource: String,
    pub namespace: Option<String>,
    pub name: String,
    pub object: Option<Resource>,
    pub old_object: Option<Resource>,
    pub user_info: AdmissionUserInfo,
    pub dry_run: bool,
}

/// Mutation result. `updated_object` must be set on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutatingResponse {
    pub updated_object: Option<Resource>,
}

impl MutatingResponse {
    pub fn updated(obj: Resource) -> Self {
        Self { updated_object: Some(obj) }
    }
}

/// Application side of admission. Both hooks default to `Unimplemented`.
#[async_trait::async_trait]
pub trait AdmissionHooks: Send + Sync {
    async fn mutate(&self, _ctx: &RequestContext, _req: &AdmissionRequest) -> KappResult<MutatingResponse> {
        Err(KappError::Unimplemented("mutate".to_string()))
    }

    async fn validate(&self, _ctx: &RequestContext, _req: &AdmissionRequest) -> KappResult<()> {
        Err(KappError::Unimplemented("validate".to_string()))
    }
}
