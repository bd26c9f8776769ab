use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserId;

/// Functions may store at most this many bytes of JS source (spec §3).
pub const MAX_SOURCE_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub owner: UserId,
    pub name: String,
    pub source: String,
    pub secret_refs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Function {
    /// Enforces the invariants from spec §3: name uniqueness is a DB-level
    /// constraint, but shape invariants are checked here before persisting.
    pub fn validate(&self, owner_secret_names: &[String]) -> Result<(), String> {
        if self.source.len() > MAX_SOURCE_BYTES {
            return Err(format!(
                "source exceeds MAX_SOURCE_BYTES ({MAX_SOURCE_BYTES})"
            ));
        }
        for secret_ref in &self.secret_refs {
            if !owner_secret_names.contains(secret_ref) {
                return Err(format!("secret_refs contains unknown secret {secret_ref}"));
            }
        }
        Ok(())
    }
}
