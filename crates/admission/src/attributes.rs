//! Host-side view of an admission call.

use k8s_openapi::api::authentication::v1::UserInfo;
use kapp_core::{Resource, ResourceKind};

/// Operation as reported by the host API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

/// Generic admission attributes supplied by the host. The object is owned by
/// the host; mutation writes through [`Attributes::object_mut`].
pub trait Attributes: Send + Sync {
    fn operation(&self) -> Operation;
    fn kind(&self) -> &ResourceKind;
    /// Plural resource name.
    fn resource(&self) -> &str {
        &self.kind().plural
    }
    fn subresource(&self) -> &str;
    fn namespace(&self) -> Option<&str>;
    fn name(&self) -> &str;
    fn object(&self) -> Option<&Resource>;
    fn object_mut(&mut self) -> Option<&mut Resource>;
    fn old_object(&self) -> Option<&Resource>;
    fn user_info(&self) -> &UserInfo;
    fn is_dry_run(&self) -> bool;
}

/// Plain-data [`Attributes`].
#[derive(Debug, Clone)]
pub struct AttributesRecord {
    pub operation: Operation,
    pub kind: ResourceKind,
    pub subresource: String,
    pub namespace: Option<String>,
    pub name: String,
    pub object: Option<Resource>,
    pub old_object: Option<Resource>,
    pub user_info: UserInfo,
    pub dry_run: bool,
}

impl AttributesRecord {
    pub fn new(operation: Operation, kind: ResourceKind, namespace: Option<&str>, name: &str) -> Self {
        Self {
            operation,
            kind,
            subresource: String::new(),
            namespace: namespace.map(|s| s.to_string()),
            name: name.to_string(),
            object: None,
            old_object: None,
            user_info: UserInfo::default(),
            dry_run: false,
        }
    }

    pub fn with_object(mut self, obj: Resource) -> Self {
        self.object = Some(obj);
        self
    }

    pub fn with_old_object(mut self, obj: Resource) -> Self {
        self.old_object = Some(obj);
        self
    }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user_info = user;
        self
    }

    pub fn with_subresource(mut self, sub: &str) -> Self {
        self.subresource = sub.to_string();
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

impl Attributes for AttributesRecord {
    fn operation(&self) -> Operation {
        self.operation
    }
    fn kind(&self) -> &ResourceKind {
        &self.kind
    }
    fn subresource(&self) -> &str {
        &self.subresource
    }
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn object(&self) -> Option<&Resource> {
        self.object.as_ref()
    }
    fn object_mut(&mut self) -> Option<&mut Resource> {
        self.object.as_mut()
    }
    fn old_object(&self) -> Option<&Resource> {
        self.old_object.as_ref()
    }
    fn user_info(&self) -> &UserInfo {
        &self.user_info
    }
    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
