//! Per-product service façades
//!
//! Each façade bundles the shared [`Client`](crate::client::Client) with the
//! [`LogId`](crate::logid::LogId) of the operation it serves. Describe helpers
//! return `Ok(None)` when the resource is absent, and `*_state_refresh`
//! helpers return the shape expected by
//! [`StateWaiter`](stratus_core::waiter::StateWaiter).

pub mod cbs;
pub mod cvm;
pub mod monitor;
pub mod tag;

pub use cbs::CbsService;
pub use cvm::CvmService;
pub use monitor::MonitorService;
pub use tag::TagService;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Availability zone and project of a CVM or CBS resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Placement {
    #[serde(default)]
    pub zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
}

/// Generic `{Name, Values}` describe filter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Response of actions that return nothing but a request id
#[derive(Debug, Default, Deserialize)]
pub struct Empty {}

pub(crate) fn is_empty_slice<T>(items: &&[T]) -> bool {
    items.is_empty()
}

/// Take the single id a create action returned
pub(crate) fn single_id(action: &str, ids: Vec<String>) -> Result<String, ApiError> {
    ids.into_iter().next().ok_or_else(|| ApiError::Decode {
        action: action.to_string(),
        message: "response contains no resource id".to_string(),
    })
}

/// Map "not found" errors to `None`
pub(crate) fn absent_if_not_found<T>(result: Result<T, ApiError>) -> Result<Option<T>, ApiError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
