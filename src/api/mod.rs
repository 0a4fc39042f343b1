pub mod client;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ApiResult;

pub use client::GeotabClient;

/// One remote operation, suitable for standalone dispatch or for
/// inclusion in a multi-call batch.
#[derive(Debug, Clone, Serialize)]
pub struct RpcCall {
    pub method: String,
    pub params: Value,
}

impl RpcCall {
    /// List query for one entity type over a date window.
    pub fn get_range(type_name: &str, from: &str, to: &str) -> Self {
        Self {
            method: "Get".to_string(),
            params: json!({
                "typeName": type_name,
                "search": { "fromDate": from, "toDate": to },
            }),
        }
    }

    /// Point query for one entity by identifier. Returns a singleton list.
    pub fn get_by_id(type_name: &str, id: &str) -> Self {
        Self {
            method: "Get".to_string(),
            params: json!({
                "typeName": type_name,
                "search": { "id": id },
            }),
        }
    }

    /// Unfiltered list query with a results cap.
    pub fn get_all(type_name: &str, results_limit: u32) -> Self {
        Self {
            method: "Get".to_string(),
            params: json!({
                "typeName": type_name,
                "resultsLimit": results_limit,
            }),
        }
    }
}

/// The remote RPC surface the pipeline consumes. Implemented over HTTP
/// by [`GeotabClient`]; tests substitute scripted fakes.
#[async_trait]
pub trait FleetApi: Send + Sync {
    /// Single-call dispatch. `Get` calls resolve to a list of entities.
    async fn call(&self, call: &RpcCall) -> ApiResult<Value>;

    /// Batched heterogeneous dispatch. Results are positionally aligned
    /// with `calls`.
    async fn multi_call(&self, calls: &[RpcCall]) -> ApiResult<Vec<Value>>;
}
