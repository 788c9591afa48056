use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::SqlParam;
use crate::error::{AppError, AppResult, OptionExt};
use crate::reply::{Reply, SuccessResponse};
use crate::state::AppState;

const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct Count {
    total: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<SuccessResponse<Vec<User>>> {
    let Query(q) = query?;
    if q.page == 0 {
        return Err(AppError::BadRequest("page must be >= 1".to_string()));
    }
    if q.limit > MAX_PAGE_SIZE {
        return Err(AppError::BadRequest(format!("limit must be <= {}", MAX_PAGE_SIZE)));
    }

    let total = state
        .db
        .query::<Count>("SELECT COUNT(*) AS total FROM users", vec![])
        .await?
        .first()
        .map(|c| c.total.max(0) as u64)
        .unwrap_or(0);

    // limit == 0 is rejected by paginate; skip the query in that case
    let rows = if q.limit == 0 {
        Vec::new()
    } else {
        let offset = (q.page - 1).saturating_mul(q.limit);
        state
            .db
            .query::<User>(
                "SELECT id, email, name, created_at, updated_at FROM users ORDER BY id LIMIT ? OFFSET ?",
                vec![SqlParam::Int(q.limit as i64), SqlParam::Int(offset.min(i64::MAX as u64) as i64)],
            )
            .await?
    };

    Ok(Reply::paginate(rows, total, q.page, q.limit, None)?)
}

pub async fn get_user(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<SuccessResponse<User>> {
    let Path(id) = path?;
    let user = state
        .db
        .query::<User>(
            "SELECT id, email, name, created_at, updated_at FROM users WHERE id = ?",
            vec![SqlParam::Int(id)],
        )
        .await?
        .into_iter()
        .next()
        .ok_or_not_found("User")?;
    Ok(Reply::success(user))
}

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUser>, JsonRejection>,
) -> AppResult<SuccessResponse<User>> {
    let Json(input) = payload?;
    validate_email(&input.email)?;

    let email = input.email.trim().to_lowercase();
    let name = input.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

    let user = state
        .db
        .transaction(move |tx| {
            Box::pin(async move {
                let id = sqlx::query("INSERT INTO users (email, name) VALUES (?, ?)")
                    .bind(email)
                    .bind(name)
                    .execute(&mut **tx)
                    .await?
                    .last_insert_rowid();
                let user = sqlx::query_as::<_, User>(
                    "SELECT id, email, name, created_at, updated_at FROM users WHERE id = ?",
                )
                .bind(id)
                .fetch_one(&mut **tx)
                .await?;
                Ok::<_, AppError>(user)
            })
        })
        .await?;

    tracing::info!(user_id = user.id, "User created");
    Ok(Reply::success(user).with_message("User created"))
}

pub async fn delete_user(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<SuccessResponse<()>> {
    let Path(id) = path?;
    let affected = state.db.execute("DELETE FROM users WHERE id = ?", vec![SqlParam::Int(id)]).await?;
    if affected == 0 {
        return Err(AppError::not_found("User"));
    }
    Ok(Reply::success(()).with_message("User deleted"))
}

fn validate_email(email: &str) -> AppResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::invalid_field("email", "email is required"));
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid {
        return Err(AppError::invalid_field("email", "must be a valid email address"));
    }
    Ok(())
}
