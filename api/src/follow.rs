use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{Method, StatusCode},
    Json,
};
use serde::Deserialize;
use yatube_shared::{CreateFollow, Follow};

use crate::{
    auth::CurrentUser,
    db,
    error::ApiError,
    permissions::{check_permission, IsOwnerOrIsAuthenticated},
    serializers::{follow_from_row, insert_follow, validate_follow},
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    search: Option<String>,
}

/// Splits a search string into terms on whitespace and commas.
fn search_terms(search: &str) -> Vec<String> {
    search
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Escapes LIKE wildcards so a term matches literally as a substring.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Builds the listing query for the caller's outgoing edges. Every term must
/// match either username, case-insensitively.
fn list_query(terms: &[String]) -> String {
    let mut sql = String::from(
        "SELECT u.username, f.username
         FROM follows e
         JOIN users u ON e.user_id = u.id
         JOIN users f ON e.following_id = f.id
         WHERE e.user_id = ?1",
    );
    for i in 0..terms.len() {
        let n = i + 2;
        sql.push_str(&format!(
            " AND (u.username LIKE ?{n} ESCAPE '\\' OR f.username LIKE ?{n} ESCAPE '\\')"
        ));
    }
    sql.push_str(" ORDER BY e.id");
    sql
}

/// GET /v1/follow/?search=
pub async fn list_follows(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Follow>>, ApiError> {
    check_permission(&IsOwnerOrIsAuthenticated, &Method::GET, current.get())?;
    let user = current.required()?;

    let terms = params.search.as_deref().map(search_terms).unwrap_or_default();

    let follows = db::query(&state.db, move |conn| {
        let mut values: Vec<rusqlite::types::Value> = vec![user.id.into()];
        values.extend(terms.iter().map(|t| like_pattern(t).into()));

        let mut stmt = conn.prepare(&list_query(&terms))?;
        let follows = stmt
            .query_map(rusqlite::params_from_iter(values), follow_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(follows)
    })
    .await?;

    Ok(Json(follows))
}

/// POST /v1/follow/
pub async fn create_follow(
    State(state): State<AppState>,
    current: CurrentUser,
    payload: Result<Json<CreateFollow>, JsonRejection>,
) -> Result<(StatusCode, Json<Follow>), ApiError> {
    check_permission(&IsOwnerOrIsAuthenticated, &Method::POST, current.get())?;
    let user = current.required()?;
    let Json(payload) = payload?;

    let follow = db::query(&state.db, move |conn| {
        let (following_id, following) = validate_follow(conn, payload, &user)?;
        insert_follow(conn, user.id, following_id)?;
        Ok(Follow {
            user: user.username,
            following,
        })
    })
    .await?;

    tracing::info!(user = %follow.user, following = %follow.following, "follow created");
    Ok((StatusCode::CREATED, Json(follow)))
}
