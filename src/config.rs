//! Configuration resolution: file -> environment -> CLI flags (spec §6).

use clap::Parser;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub dsn: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub network_id: u32,
    pub gas_bank_contract: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnclaveConfig {
    pub memory_limit_mb: u64,
    pub timeout_sec: u64,
    pub attestation_url: Option<String>,
    #[serde(default)]
    pub fetch_allowlist: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub signing_secret: String,
    pub token_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    pub master_key_ref: String,
    pub secret_default_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub enclave: EnclaveConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

/// CLI overrides layered on top of file + environment configuration.
#[derive(Debug, Parser)]
#[command(name = "neo-oracle-platform")]
pub struct CliArgs {
    #[arg(long, env = "NEO_ORACLE_CONFIG")]
    pub config_file: Option<String>,

    #[arg(long, env = "NEO_ORACLE_SERVER_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "NEO_ORACLE_CHAIN_RPC_URL")]
    pub chain_rpc_url: Option<String>,
}

impl AppConfig {
    /// Resolves config file -> env vars (prefix `NEO_ORACLE_`) -> CLI flags, in that order.
    pub fn load(cli: &CliArgs) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder().add_source(config::File::with_name(
            cli.config_file.as_deref().unwrap_or("config/default"),
        ).required(false));

        builder = builder.add_source(
            config::Environment::with_prefix("NEO_ORACLE")
                .separator("__")
                .try_parsing(true),
        );

        let mut cfg: AppConfig = builder.build()?.try_deserialize()?;

        if let Some(port) = cli.port {
            cfg.server.port = port;
        }
        if let Some(url) = &cli.chain_rpc_url {
            cfg.chain.rpc_url = url.clone();
        }

        Ok(cfg)
    }
}
