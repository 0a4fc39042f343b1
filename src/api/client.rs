use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

use super::{FleetApi, RpcCall};

/// JSON-RPC client for the MyGeotab API.
///
/// Every request is a POST of `{"method", "params"}` with session
/// credentials merged into the params; the response carries either a
/// `result` or an `error` member.
#[derive(Clone)]
pub struct GeotabClient {
    client: Client,
    api_url: String,
    credentials: Value,
}

impl GeotabClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            api_url: config.api_url.clone(),
            credentials: json!({
                "database": config.database,
                "userName": config.user_name,
                "sessionId": config.session_id,
            }),
        }
    }

    async fn dispatch(&self, method: &str, mut params: Value) -> ApiResult<Value> {
        if let Some(obj) = params.as_object_mut() {
            obj.insert("credentials".to_string(), self.credentials.clone());
        }

        let response = self
            .client
            .post(&self.api_url)
            .json(&json!({ "method": method, "params": params }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("API request failed: status={}, body={}", status, body);
            return Err(ApiError::Rpc {
                name: format!("Http{}", status.as_u16()),
                message: body,
            });
        }

        let body: Value = response.json().await?;

        if let Some(error) = body.get("error") {
            return Err(parse_rpc_error(error));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| ApiError::Malformed("response has neither result nor error".to_string()))
    }
}

/// Map a JSON-RPC error member onto the taxonomy, distinguishing the
/// rate-limit signal (with its optional retry hint) from everything else.
fn parse_rpc_error(error: &Value) -> ApiError {
    let name = error
        .pointer("/errors/0/name")
        .or_else(|| error.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("JSONRPCError")
        .to_string();
    let message = error
        .pointer("/errors/0/message")
        .or_else(|| error.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if name.contains("OverLimitException") {
        let retry_after = error
            .pointer("/rateLimit/retryAfter")
            .or_else(|| error.pointer("/errors/0/rateLimit/retryAfter"))
            .and_then(Value::as_f64)
            .map(Duration::from_secs_f64);
        return ApiError::OverLimit { retry_after };
    }

    ApiError::Rpc { name, message }
}

#[async_trait]
impl FleetApi for GeotabClient {
    async fn call(&self, call: &RpcCall) -> ApiResult<Value> {
        self.dispatch(&call.method, call.params.clone()).await
    }

    async fn multi_call(&self, calls: &[RpcCall]) -> ApiResult<Vec<Value>> {
        let wrapped: Vec<Value> = calls
            .iter()
            .map(|c| json!({ "method": c.method, "params": c.params }))
            .collect();

        let result = self
            .dispatch("ExecuteMultiCall", json!({ "calls": wrapped }))
            .await?;

        match result {
            Value::Array(items) => Ok(items),
            other => Err(ApiError::Malformed(format!(
                "multi-call result is not an array: {}",
                other
            ))),
        }
    }
}
