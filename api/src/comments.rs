//! Comments nested under `/v1/posts/{post_id}/comments/`. Every operation
//! first resolves the post, so a missing post is a 404 regardless of the
//! comment id.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{Method, StatusCode},
    Json,
};
use rusqlite::Connection;
use yatube_shared::{Comment, CommentPayload};

use crate::{
    auth::CurrentUser,
    db,
    error::ApiError,
    permissions::{check_object_permission, check_permission, IsOwnerOrReadOnly},
    serializers::{comment_from_row, validate_comment, COMMENT_COLUMNS},
    AppState,
};

fn ensure_post(conn: &Connection, post_id: i64) -> Result<(), ApiError> {
    if db::exists(conn, "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)", post_id)? {
        Ok(())
    } else {
        Err(ApiError::NotFound)
    }
}

fn fetch_comment(conn: &Connection, post_id: i64, id: i64) -> Result<(Comment, i64), ApiError> {
    let sql = format!(
        "SELECT {COMMENT_COLUMNS}
         FROM comments c JOIN users u ON c.author_id = u.id
         WHERE c.id = ?1 AND c.post_id = ?2"
    );
    Ok(conn.query_row(&sql, [id, post_id], comment_from_row)?)
}

/// GET /v1/posts/{post_id}/comments/
pub async fn list_comments(
    State(state): State<AppState>,
    _current: CurrentUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let Path(post_id) = path?;

    let comments = db::query(&state.db, move |conn| {
        ensure_post(conn, post_id)?;

        let sql = format!(
            "SELECT {COMMENT_COLUMNS}
             FROM comments c JOIN users u ON c.author_id = u.id
             WHERE c.post_id = ?1
             ORDER BY c.id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let comments = stmt
            .query_map([post_id], comment_from_row)?
            .map(|r| r.map(|(comment, _)| comment))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    })
    .await?;

    Ok(Json(comments))
}

/// POST /v1/posts/{post_id}/comments/
pub async fn create_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CommentPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    check_permission(&IsOwnerOrReadOnly, &Method::POST, current.get())?;
    let author = current.required()?;
    let Path(post_id) = path?;

    let author_id = author.id;
    let comment = db::query(&state.db, move |conn| {
        ensure_post(conn, post_id)?;

        let Json(payload) = payload?;
        let text = validate_comment(payload, false)?;
        conn.execute(
            "INSERT INTO comments (post_id, author_id, text) VALUES (?1, ?2, ?3)",
            rusqlite::params![post_id, author_id, text],
        )?;

        let (comment, _) = fetch_comment(conn, post_id, conn.last_insert_rowid())?;
        Ok(comment)
    })
    .await?;

    tracing::info!(post_id, comment_id = comment.id, author = %author.username, "comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /v1/posts/{post_id}/comments/{id}/
pub async fn get_comment(
    State(state): State<AppState>,
    _current: CurrentUser,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Json<Comment>, ApiError> {
    let Path((post_id, id)) = path?;

    let (comment, _) = db::query(&state.db, move |conn| {
        ensure_post(conn, post_id)?;
        fetch_comment(conn, post_id, id)
    })
    .await?;

    Ok(Json(comment))
}

/// PUT | PATCH /v1/posts/{post_id}/comments/{id}/
pub async fn update_comment(
    State(state): State<AppState>,
    method: Method,
    current: CurrentUser,
    path: Result<Path<(i64, i64)>, PathRejection>,
    payload: Result<Json<CommentPayload>, JsonRejection>,
) -> Result<Json<Comment>, ApiError> {
    check_permission(&IsOwnerOrReadOnly, &method, current.get())?;
    let Path((post_id, id)) = path?;
    let partial = method == Method::PATCH;

    let comment = db::query(&state.db, move |conn| {
        ensure_post(conn, post_id)?;
        let (_, author_id) = fetch_comment(conn, post_id, id)?;
        check_object_permission(&IsOwnerOrReadOnly, &method, current.get(), author_id)?;

        let Json(payload) = payload?;
        if let Some(text) = validate_comment(payload, partial)? {
            conn.execute(
                "UPDATE comments SET text = ?1 WHERE id = ?2",
                rusqlite::params![text, id],
            )?;
        }

        let (comment, _) = fetch_comment(conn, post_id, id)?;
        Ok(comment)
    })
    .await?;

    tracing::info!(post_id, comment_id = id, partial, "comment updated");
    Ok(Json(comment))
}

/// DELETE /v1/posts/{post_id}/comments/{id}/
pub async fn delete_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    check_permission(&IsOwnerOrReadOnly, &Method::DELETE, current.get())?;
    let Path((post_id, id)) = path?;

    db::query(&state.db, move |conn| {
        ensure_post(conn, post_id)?;
        let (_, author_id) = fetch_comment(conn, post_id, id)?;
        check_object_permission(&IsOwnerOrReadOnly, &Method::DELETE, current.get(), author_id)?;
        conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
        Ok(())
    })
    .await?;

    tracing::info!(post_id, comment_id = id, "comment deleted");
    Ok(StatusCode::NO_CONTENT)
}
