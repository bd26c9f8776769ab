use sqlx::{PgPool, Row};

use crate::error::{AppError, AppResult};
use crate::models::{Role, User, UserId};

fn row_to_user(row: &sqlx::postgres::PgRow) -> AppResult<User> {
    let roles: serde_json::Value = row.try_get("roles")?;
    Ok(User {
        id: UserId(row.try_get("id")?),
        email: row.try_get("email")?,
        roles: serde_json::from_value::<Vec<Role>>(roles).unwrap_or_default(),
        created_at: row.try_get("created_at")?,
        quotas: row.try_get("quotas")?,
    })
}

pub async fn get(pool: &PgPool, id: UserId) -> AppResult<User> {
    let row = sqlx::query("SELECT * FROM users WHERE id = $1")
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    row_to_user(&row)
}

pub async fn find_by_api_key_hash(pool: &PgPool, key_hash: &str) -> AppResult<Option<User>> {
    let row = sqlx::query(
        "SELECT u.* FROM users u
         JOIN api_keys k ON k.user_id = u.id
         WHERE k.key_hash = $1 AND NOT k.revoked",
    )
    .bind(key_hash)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(row_to_user).transpose()
}

pub async fn create(pool: &PgPool, user: &User) -> AppResult<()> {
    let roles = serde_json::to_value(&user.roles)?;
    sqlx::query("INSERT INTO users (id, email, roles, quotas, created_at) VALUES ($1, $2, $3, $4, $5)")
        .bind(user.id.0)
        .bind(&user.email)
        .bind(roles)
        .bind(&user.quotas)
        .bind(user.created_at)
        .execute(pool)
        .await?;
    Ok(())
}
