//! kapp admission: translate host admission attributes into app-level
//! mutate/validate calls.

#![forbid(unsafe_code)]

mod attributes;
mod capabilities;
mod request;
mod translator;

pub use attributes::{Attributes, AttributesRecord, Operation};
pub use capabilities::{AdmissionCapabilities, AdmissionCapability, AdmissionOperation};
pub use request::{AdmissionAction, AdmissionHooks, AdmissionRequest, AdmissionUserInfo, MutatingResponse};
pub use translator::{AdmissionTranslator, UnimplementedPolicy};
