pub mod manager;
pub mod poller;
pub mod state_machine;

pub use manager::{NewTransaction, TransactionManager};
