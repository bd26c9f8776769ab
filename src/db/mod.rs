pub mod events_repo;
pub mod executions_repo;
pub mod functions_repo;
pub mod gasbank_repo;
pub mod oracle_repo;
pub mod pool;
pub mod pricefeeds_repo;
pub mod random_repo;
pub mod secrets_repo;
pub mod subscriptions_repo;
pub mod transactions_repo;
pub mod triggers_repo;
pub mod users_repo;
pub mod wallet_repo;

pub use pool::Db;
