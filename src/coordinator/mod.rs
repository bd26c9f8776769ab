//! Execution coordinator (C10): the seven-step pipeline from spec §4.10,
//! composing the secret store (C3), the enclave runtime (C4), and the
//! transaction manager + gas bank (C5/C6) into one `handle` call per
//! invocation event. No internal retries -- design note §9: retries here
//! would violate at-most-once firing.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bus::TriggerEventBus;
use crate::db::{executions_repo, functions_repo, triggers_repo};
use crate::enclave::{EnclaveHandle, EnclaveOutcome, EnclaveRequest, EnclaveRuntime};
use crate::gasbank::GasBankLedger;
use crate::models::{
    Execution, ExecutionId, ExecutionStatus, FunctionId, TriggerEvent, TriggerEventId,
    TriggerEventStatus, TriggerId, TxId, TxType, UserId,
};
use crate::scheduler::InvocationEvent;
use crate::secrets::SecretStore;
use crate::tx::manager::{NewTransaction, TransactionManager};
use crate::wallet::WalletStore;

/// A `tx_intent` object returned from the enclave's `result_json` (spec
/// §4.4/§6: "A returned object with key `tx_intent` is interpreted as
/// described in §4.10").
#[derive(Debug, serde::Deserialize)]
struct TxIntentPayload {
    script: String,
    #[serde(default)]
    signers: Vec<String>,
    gas_budget: i64,
}

pub struct CoordinatorConfig {
    pub exec_timeout_ms: u64,
    pub memory_limit_mb: u64,
}

pub struct Coordinator {
    pool: PgPool,
    secrets: Arc<SecretStore>,
    enclave: Arc<dyn EnclaveRuntime>,
    wallet: Arc<WalletStore>,
    tx_manager: Arc<TransactionManager>,
    gasbank: Arc<GasBankLedger>,
    trigger_event_bus: TriggerEventBus,
    config: CoordinatorConfig,
    /// Non-blocking per-trigger in-flight lock (spec §4.10): additional
    /// fires while one is in-flight are dropped, counted here for
    /// observability.
    inflight: DashMap<TriggerId, ()>,
    dropped: DashMap<TriggerId, u64>,
}

impl Coordinator {
    pub fn new(
        pool: PgPool,
        secrets: Arc<SecretStore>,
        enclave: Arc<dyn EnclaveRuntime>,
        wallet: Arc<WalletStore>,
        tx_manager: Arc<TransactionManager>,
        gasbank: Arc<GasBankLedger>,
        trigger_event_bus: TriggerEventBus,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            secrets,
            enclave,
            wallet,
            tx_manager,
            gasbank,
            trigger_event_bus,
            config,
            inflight: DashMap::new(),
            dropped: DashMap::new(),
        })
    }

    pub fn dropped_count(&self, trigger_id: TriggerId) -> u64 {
        self.dropped.get(&trigger_id).map(|v| *v).unwrap_or(0)
    }

    /// Drains the invocation queue, spawning one task per event so
    /// unrelated triggers run concurrently while same-trigger firings stay
    /// serialized by `inflight` (spec §5c).
    pub fn spawn(self: Arc<Self>, mut rx: mpsc::Receiver<InvocationEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let this = self.clone();
                tokio::spawn(async move { this.handle(event).await });
            }
        })
    }

    pub async fn handle(&self, event: InvocationEvent) {
        if self.inflight.insert(event.trigger_id, ()).is_some() {
            self.dropped
                .entry(event.trigger_id)
                .and_modify(|n| *n += 1)
                .or_insert(1);
            tracing::debug!(trigger_id = %event.trigger_id.0, "dropped fire: trigger already in flight");
            return;
        }
        let result = self.handle_locked(&event).await;
        self.inflight.remove(&event.trigger_id);
        if let Err(err) = result {
            tracing::error!(trigger_id = %event.trigger_id.0, %err, "coordinator pipeline failed");
        }
    }

    async fn handle_locked(&self, event: &InvocationEvent) -> crate::error::AppResult<()> {
        let execution_id = ExecutionId(Uuid::new_v4());

        // Step 1: load function.
        let function = match functions_repo::get(&self.pool, event.function_id).await {
            Ok(f) => f,
            Err(_) => {
                self.emit_trigger_event(event.trigger_id, TriggerEventStatus::Error, None).await;
                return Ok(());
            }
        };

        // Step 2: union parameter map is already folded into event.params
        // by the scheduler (trigger-specific payload + manual overrides).
        let params = event.params.clone();

        // Step 3: gather declared secrets, audited per name actually read.
        let secrets = match self
            .secrets
            .load_for_execution(event.owner, &function.secret_refs, execution_id.0)
            .await
        {
            Ok(map) => map,
            Err(err) => {
                self.persist_execution_error(execution_id, &function.id, event.owner, &params, &err.to_string())
                    .await?;
                self.emit_trigger_event(event.trigger_id, TriggerEventStatus::Error, Some(execution_id))
                    .await;
                return Ok(());
            }
        };

        // Step 4: run inside the enclave.
        let request = EnclaveRequest {
            source: function.source.clone(),
            params_json: params.clone(),
            secrets_map: secrets,
            deadline_ms: self.config.exec_timeout_ms,
            memory_limit_mb: self.config.memory_limit_mb,
        };
        let started_at = Utc::now();
        let result = self.enclave.run(execution_id.0, request).await;
        let finished_at = Utc::now();

        // Step 5: persist the execution row.
        let execution = Execution {
            id: execution_id,
            function_id: function.id,
            user_id: event.owner,
            started_at,
            finished_at: Some(finished_at),
            status: map_outcome(result.status),
            duration_ms: result.duration_ms,
            result_json: result.result_json.clone(),
            error_msg: result.error_msg.clone(),
            params_json: params,
        };
        executions_repo::insert(&self.pool, &execution).await?;

        // Step 6: a successful result may carry a tx_intent.
        if matches!(result.status, EnclaveOutcome::Success) {
            if let Some(intent) = result
                .result_json
                .as_ref()
                .and_then(|v| v.get("tx_intent"))
                .cloned()
            {
                if let Err(err) = self.submit_tx_intent(function.id, event.owner, execution_id, intent).await {
                    tracing::error!(%err, function_id = %function.id.0, "failed to submit tx_intent");
                }
            }
        }

        // Step 7: emit the TriggerEvent.
        let trigger_status = if matches!(result.status, EnclaveOutcome::Success) {
            TriggerEventStatus::Success
        } else {
            TriggerEventStatus::Error
        };
        self.emit_trigger_event(event.trigger_id, trigger_status, Some(execution_id)).await;
        Ok(())
    }

    async fn submit_tx_intent(
        &self,
        function_id: FunctionId,
        owner: UserId,
        execution_id: ExecutionId,
        intent_value: serde_json::Value,
    ) -> crate::error::AppResult<()> {
        let intent: TxIntentPayload = serde_json::from_value(intent_value)
            .map_err(|e| crate::error::AppError::new(crate::error::ErrorCode::InvalidFormat, e.to_string()))?;

        let tx_id = TxId(Uuid::new_v4());
        self.gasbank.allocate(owner, tx_id, intent.gas_budget).await?;

        let handle = EnclaveHandle::new(execution_id.0);
        let script_bytes = intent.script.into_bytes();
        let signature = self
            .wallet
            .sign("platform", &script_bytes, handle.token())
            .await?;
        let mut signed_bytes = script_bytes;
        signed_bytes.extend_from_slice(&signature);

        let public_key = self.wallet.get_public_key("platform").await.unwrap_or_default();

        match self
            .tx_manager
            .submit(NewTransaction {
                id: Some(tx_id),
                service: "platform".to_string(),
                entity_id: function_id.0,
                entity_type: "function".to_string(),
                tx_type: TxType::FunctionCallback,
                payload: serde_json::json!({ "signers": intent.signers }),
                signed_bytes,
                gas_price: 0,
                system_fee: intent.gas_budget,
                network_fee: 0,
                sender_address: public_key,
                user_id: Some(owner.0),
            })
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                // The tx manager never reached a terminal state that the
                // gas bank's own bus consumer would resolve, so refund the
                // reservation directly instead of leaving it stranded.
                if let Some(allocation_id) =
                    crate::db::gasbank_repo::allocation_for_tx(&self.pool, tx_id).await?
                {
                    self.gasbank.refund(allocation_id).await?;
                }
                Err(err)
            }
        }
    }

    async fn persist_execution_error(
        &self,
        execution_id: ExecutionId,
        function_id: &FunctionId,
        owner: UserId,
        params: &serde_json::Value,
        message: &str,
    ) -> crate::error::AppResult<()> {
        let now = Utc::now();
        executions_repo::insert(
            &self.pool,
            &Execution {
                id: execution_id,
                function_id: *function_id,
                user_id: owner,
                started_at: now,
                finished_at: Some(now),
                status: ExecutionStatus::Error,
                duration_ms: 0,
                result_json: None,
                error_msg: Some(message.to_string()),
                params_json: params.clone(),
            },
        )
        .await
    }

    async fn emit_trigger_event(
        &self,
        trigger_id: TriggerId,
        status: TriggerEventStatus,
        execution_id: Option<ExecutionId>,
    ) {
        let event = TriggerEvent {
            id: TriggerEventId(Uuid::new_v4()),
            trigger_id,
            fired_at: Utc::now(),
            status,
            execution_id: execution_id.map(|id| id.0),
        };
        if let Err(err) = triggers_repo::insert_trigger_event(&self.pool, &event).await {
            tracing::error!(%err, "failed to persist trigger event");
            return;
        }
        self.trigger_event_bus.publish(event);
    }
}

fn map_outcome(outcome: EnclaveOutcome) -> ExecutionStatus {
    match outcome {
        EnclaveOutcome::Success => ExecutionStatus::Success,
        EnclaveOutcome::Error => ExecutionStatus::Error,
        EnclaveOutcome::Timeout => ExecutionStatus::Timeout,
        EnclaveOutcome::MemoryExceeded => ExecutionStatus::MemoryExceeded,
        EnclaveOutcome::SandboxViolation => ExecutionStatus::SandboxViolation,
    }
}
