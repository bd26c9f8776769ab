//! Test-only enclave double (spec.md §9: "testable with a virtual clock").
//! Evaluates a tiny command convention instead of embedding a JS VM, so the
//! S1/S2/S6 seed scenarios and unit suites don't need `rquickjs` linked for
//! a fast `cargo test`. Source strings are one of:
//! `"return <json>"`, `"sleep"` (always times out), `"allocate"` (always
//! exceeds memory), `"throw <message>"`, or `"touch <capability>"`.

use async_trait::async_trait;
use uuid::Uuid;

use super::{EnclaveOutcome, EnclaveRequest, EnclaveResult, EnclaveRuntime};

#[derive(Default)]
pub struct MockEnclaveRuntime;

#[async_trait]
impl EnclaveRuntime for MockEnclaveRuntime {
    async fn run(&self, _execution_id: Uuid, request: EnclaveRequest) -> EnclaveResult {
        let source = request.source.trim();

        if let Some(rest) = source.strip_prefix("return ") {
            let value = serde_json::from_str(rest).unwrap_or(serde_json::Value::Null);
            return EnclaveResult {
                status: EnclaveOutcome::Success,
                result_json: Some(value),
                error_msg: None,
                duration_ms: 1,
                console_log: vec![],
            };
        }

        if source == "sleep" {
            return EnclaveResult {
                status: EnclaveOutcome::Timeout,
                result_json: None,
                error_msg: Some("execution exceeded deadline".to_string()),
                duration_ms: request.deadline_ms,
                console_log: vec![],
            };
        }

        if source == "allocate" {
            return EnclaveResult {
                status: EnclaveOutcome::MemoryExceeded,
                result_json: None,
                error_msg: Some("peak resident memory exceeded memory_limit".to_string()),
                duration_ms: 1,
                console_log: vec![],
            };
        }

        if let Some(rest) = source.strip_prefix("throw ") {
            return EnclaveResult {
                status: EnclaveOutcome::Error,
                result_json: None,
                error_msg: Some(rest.to_string()),
                duration_ms: 1,
                console_log: vec![],
            };
        }

        if let Some(capability) = source.strip_prefix("touch ") {
            return EnclaveResult {
                status: EnclaveOutcome::SandboxViolation,
                result_json: None,
                error_msg: Some(format!("disallowed capability: {capability}")),
                duration_ms: 1,
                console_log: vec![],
            };
        }

        EnclaveResult {
            status: EnclaveOutcome::Success,
            result_json: Some(serde_json::json!({ "params": request.params_json })),
            error_msg: None,
            duration_ms: 1,
            console_log: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(source: &str) -> EnclaveRequest {
        EnclaveRequest {
            source: source.to_string(),
            params_json: serde_json::json!({}),
            secrets_map: Default::default(),
            deadline_ms: 5000,
            memory_limit_mb: 64,
        }
    }

    #[tokio::test]
    async fn sleep_times_out() {
        let result = MockEnclaveRuntime.run(Uuid::new_v4(), request("sleep")).await;
        assert_eq!(result.status, EnclaveOutcome::Timeout);
    }

    #[tokio::test]
    async fn allocate_exceeds_memory() {
        let result = MockEnclaveRuntime.run(Uuid::new_v4(), request("allocate")).await;
        assert_eq!(result.status, EnclaveOutcome::MemoryExceeded);
    }

    #[tokio::test]
    async fn touch_reports_capability() {
        let result = MockEnclaveRuntime.run(Uuid::new_v4(), request("touch fs")).await;
        assert_eq!(result.status, EnclaveOutcome::SandboxViolation);
        assert!(result.error_msg.unwrap().contains("fs"));
    }

    #[tokio::test]
    async fn returns_declared_value() {
        let result = MockEnclaveRuntime
            .run(Uuid::new_v4(), request(r#"return {"ok":true}"#))
            .await;
        assert_eq!(result.status, EnclaveOutcome::Success);
        assert_eq!(result.result_json.unwrap(), serde_json::json!({"ok": true}));
    }
}
