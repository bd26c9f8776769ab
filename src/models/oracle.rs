use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OracleDataSourceId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OracleAuth {
    None,
    Bearer { token: String },
    Basic { username: String, password: String },
    ApiKeyHeader { header: String, value: String },
}

/// A reusable external HTTP data-source definition (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleDataSource {
    pub id: OracleDataSourceId,
    pub owner: UserId,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: serde_json::Value,
    pub auth: OracleAuth,
    /// JSON-pointer-ish path into the response body, e.g. "/data/price".
    pub response_path: String,
    /// Optional JS transform applied to the extracted value inside the enclave.
    pub transform_script: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OracleRequestId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleRequestStatus {
    Pending,
    Fulfilled,
    Failed,
}

/// Materializes a fetch for a specific caller, with an optional on-chain callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    pub id: OracleRequestId,
    pub owner: UserId,
    pub data_source_id: OracleDataSourceId,
    pub status: OracleRequestStatus,
    pub result: Option<serde_json::Value>,
    pub callback_contract: Option<String>,
    pub callback_tx_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
