//! Process entry point: resolves configuration, wires every component
//! (C1-C11) into one `AppState`, and serves the REST/websocket surface.
//! Generalizes the teacher's single `OnlineClient` + two-route `main` into
//! the platform's full component graph.

use std::sync::Arc;

use clap::Parser;
use neo_oracle_platform::api::{self, AppState};
use neo_oracle_platform::bus::EventBus;
use neo_oracle_platform::chain::{ChainClient, NeoRpcClient};
use neo_oracle_platform::config::{AppConfig, CliArgs};
use neo_oracle_platform::coordinator::{Coordinator, CoordinatorConfig};
use neo_oracle_platform::db::pool::Db;
use neo_oracle_platform::enclave::runtime::QuickJsEnclaveRuntime;
use neo_oracle_platform::enclave::EnclaveRuntime;
use neo_oracle_platform::gasbank::GasBankLedger;
use neo_oracle_platform::indexer::Indexer;
use neo_oracle_platform::models::{WalletAccount, WalletAccountId};
use neo_oracle_platform::pricefeed::PriceFeedAggregator;
use neo_oracle_platform::random::RandomService;
use neo_oracle_platform::scheduler::{Scheduler, SystemClock};
use neo_oracle_platform::secrets::{envelope, SecretStore};
use neo_oracle_platform::subscriptions::{delivery::WebhookDeliveryWorker, SubscriptionMatcher};
use neo_oracle_platform::tx::manager::TransactionManager;
use neo_oracle_platform::wallet::WalletStore;
use neo_oracle_platform::ws;

const INVOCATION_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let cfg = AppConfig::load(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&cfg.logging.level))
        .init();

    let db = Db::connect(&cfg.database).await?;
    db.migrate().await?;
    let pool = db.pool.clone();

    let master_key = resolve_master_key(&cfg.security.master_key_ref)?;

    let chain: Arc<dyn ChainClient> = Arc::new(NeoRpcClient::new(cfg.chain.rpc_url.clone()));
    let bus = EventBus::new();

    let secrets = Arc::new(SecretStore::new(pool.clone(), master_key));
    let wallet = Arc::new(WalletStore::new(pool.clone(), master_key));
    ensure_platform_wallet(&wallet, &master_key).await?;

    let enclave: Arc<dyn EnclaveRuntime> =
        Arc::new(QuickJsEnclaveRuntime::new(chain.clone(), cfg.enclave.clone()));

    let tx_manager = Arc::new(TransactionManager::new(pool.clone(), chain.clone(), bus.tx.clone()));
    let gasbank = Arc::new(GasBankLedger::new(pool.clone()));

    let mut background_tasks = Vec::new();
    background_tasks.push(neo_oracle_platform::tx::poller::spawn(tx_manager.clone(), pool.clone()));
    background_tasks.push(gasbank.clone().spawn_tx_consumer(&bus.tx));

    let indexer = Arc::new(Indexer::new(
        pool.clone(),
        chain.clone(),
        bus.chain_event.clone(),
        cfg.chain.network_id.to_string(),
    ));
    background_tasks.push(indexer.spawn());

    let matcher = SubscriptionMatcher::new(pool.clone());
    background_tasks.push(matcher.spawn(&bus.chain_event));
    background_tasks.push(WebhookDeliveryWorker::new(pool.clone()).spawn());

    let (invocation_tx, invocation_rx) = tokio::sync::mpsc::channel(INVOCATION_QUEUE_CAPACITY);
    let scheduler = Scheduler::new(
        pool.clone(),
        bus.chain_event.clone(),
        bus.price.clone(),
        invocation_tx,
        Arc::new(SystemClock),
    );
    background_tasks.extend(scheduler.start().await?);

    let coordinator = Coordinator::new(
        pool.clone(),
        secrets.clone(),
        enclave.clone(),
        wallet.clone(),
        tx_manager.clone(),
        gasbank.clone(),
        bus.trigger_event.clone(),
        CoordinatorConfig {
            exec_timeout_ms: cfg.enclave.timeout_sec * 1_000,
            memory_limit_mb: cfg.enclave.memory_limit_mb,
        },
    );
    background_tasks.push(coordinator.clone().spawn(invocation_rx));

    let pricefeed = PriceFeedAggregator::new(pool.clone(), bus.price.clone(), wallet.clone(), tx_manager.clone());
    background_tasks.extend(pricefeed.start().await?);

    let random = RandomService::new(pool.clone(), wallet.clone(), tx_manager.clone(), master_key);
    background_tasks.push(random.clone().spawn_fulfiller());

    let state = AppState {
        pool: pool.clone(),
        secrets,
        wallet,
        enclave,
        tx_manager,
        gasbank,
        scheduler,
        coordinator,
        pricefeed,
        random,
        bus,
    };

    let app = api::router(state.clone())
        .merge(ws::router().with_state(state))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "neo-oracle-platform listening");

    axum::serve(listener, app).await?;

    for task in background_tasks {
        task.abort();
    }

    Ok(())
}

/// Resolves the at-rest master key from the `env:VAR_NAME` reference scheme
/// the security config carries (spec §3: secrets are wrapped by "the master
/// key held by the enclave", which in this platform's deployment model is
/// injected as an environment variable rather than minted in-process).
fn resolve_master_key(master_key_ref: &str) -> anyhow::Result<[u8; 32]> {
    let var_name = master_key_ref
        .strip_prefix("env:")
        .ok_or_else(|| anyhow::anyhow!("unsupported master_key_ref scheme: {master_key_ref}"))?;
    let raw = std::env::var(var_name)
        .map_err(|_| anyhow::anyhow!("missing environment variable {var_name} for master key"))?;
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, raw.trim())
        .map_err(|e| anyhow::anyhow!("master key is not valid base64: {e}"))?;
    decoded
        .try_into()
        .map_err(|_| anyhow::anyhow!("master key must decode to exactly 32 bytes"))
}

/// Provisions a signing key for the `platform` service scope (used by C11
/// price-feed publishes and C10 tx_intent submissions) on first boot.
async fn ensure_platform_wallet(wallet: &WalletStore, master_key: &[u8; 32]) -> anyhow::Result<()> {
    if wallet.get_public_key("platform").await.is_ok() {
        return Ok(());
    }

    let mut private_key = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut private_key);
    let encrypted_private_key = envelope::wrap_key(master_key, &private_key)
        .map_err(|e| anyhow::anyhow!("failed to seal platform signing key: {e:?}"))?;

    use sha2::{Digest, Sha256};
    let public_key = format!("{:x}", Sha256::digest(private_key));
    let address = format!("N{}", &public_key[..33]);

    wallet
        .provision(WalletAccount {
            id: WalletAccountId(uuid::Uuid::new_v4()),
            service: "platform".to_string(),
            address,
            encrypted_private_key,
            public_key,
            created_at: chrono::Utc::now(),
            active: true,
        })
        .await?;
    Ok(())
}
