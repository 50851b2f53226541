use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        OriginalUri, Path, Query, State,
    },
    http::{Method, StatusCode},
    Json,
};
use rusqlite::Connection;
use yatube_shared::{Post, PostPayload};

use crate::{
    auth::CurrentUser,
    db,
    error::ApiError,
    pagination::{listing, Listing, Page, PageParams},
    permissions::{check_object_permission, check_permission, IsOwnerOrReadOnly},
    serializers::{post_from_row, validate_post, POST_COLUMNS},
    AppState,
};

/// Loads a post with its author id.
pub fn fetch_post(conn: &Connection, id: i64) -> Result<(Post, i64), ApiError> {
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON p.author_id = u.id WHERE p.id = ?1"
    );
    Ok(conn.query_row(&sql, [id], post_from_row)?)
}

/// GET /v1/posts/?limit=&offset=
pub async fn list_posts(
    State(state): State<AppState>,
    _current: CurrentUser,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> Result<Json<Listing<Post>>, ApiError> {
    let page = params.page(state.config.max_page_limit);
    let (limit, offset) = Page::bounds(page);

    let (posts, count) = db::query(&state.db, move |conn| {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;

        let sql = format!(
            "SELECT {POST_COLUMNS}
             FROM posts p JOIN users u ON p.author_id = u.id
             ORDER BY p.id
             LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let posts = stmt
            .query_map([limit, offset], post_from_row)?
            .map(|r| r.map(|(post, _)| post))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((posts, count))
    })
    .await?;

    let base = format!("{}{}", state.config.api_url, uri.path());
    Ok(Json(listing(posts, count, page, &base)))
}

/// POST /v1/posts/
pub async fn create_post(
    State(state): State<AppState>,
    current: CurrentUser,
    payload: Result<Json<PostPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    check_permission(&IsOwnerOrReadOnly, &Method::POST, current.get())?;
    let author = current.required()?;
    let Json(payload) = payload?;

    let author_id = author.id;
    let post = db::query(&state.db, move |conn| {
        let changes = validate_post(conn, payload, false)?;
        conn.execute(
            "INSERT INTO posts (text, image, group_id, author_id) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                changes.text,
                changes.image.flatten(),
                changes.group.flatten(),
                author_id
            ],
        )?;
        let (post, _) = fetch_post(conn, conn.last_insert_rowid())?;
        Ok(post)
    })
    .await?;

    tracing::info!(post_id = post.id, author = %author.username, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /v1/posts/{id}/
pub async fn get_post(
    State(state): State<AppState>,
    _current: CurrentUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Post>, ApiError> {
    let Path(id) = path?;
    let (post, _) = db::query(&state.db, move |conn| fetch_post(conn, id)).await?;
    Ok(Json(post))
}

/// PUT | PATCH /v1/posts/{id}/
pub async fn update_post(
    State(state): State<AppState>,
    method: Method,
    current: CurrentUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<PostPayload>, JsonRejection>,
) -> Result<Json<Post>, ApiError> {
    check_permission(&IsOwnerOrReadOnly, &method, current.get())?;
    let Path(id) = path?;
    let partial = method == Method::PATCH;

    let post = db::query(&state.db, move |conn| {
        let (_, author_id) = fetch_post(conn, id)?;
        check_object_permission(&IsOwnerOrReadOnly, &method, current.get(), author_id)?;

        let Json(payload) = payload?;
        let changes = validate_post(conn, payload, partial)?;

        if let Some(text) = changes.text {
            conn.execute("UPDATE posts SET text = ?1 WHERE id = ?2", rusqlite::params![text, id])?;
        }
        if let Some(image) = changes.image {
            conn.execute("UPDATE posts SET image = ?1 WHERE id = ?2", rusqlite::params![image, id])?;
        }
        if let Some(group) = changes.group {
            conn.execute(
                "UPDATE posts SET group_id = ?1 WHERE id = ?2",
                rusqlite::params![group, id],
            )?;
        }

        let (post, _) = fetch_post(conn, id)?;
        Ok(post)
    })
    .await?;

    tracing::info!(post_id = post.id, partial, "post updated");
    Ok(Json(post))
}

/// DELETE /v1/posts/{id}/
pub async fn delete_post(
    State(state): State<AppState>,
    current: CurrentUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    check_permission(&IsOwnerOrReadOnly, &Method::DELETE, current.get())?;
    let Path(id) = path?;

    db::query(&state.db, move |conn| {
        let (_, author_id) = fetch_post(conn, id)?;
        check_object_permission(&IsOwnerOrReadOnly, &Method::DELETE, current.get(), author_id)?;
        conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
        Ok(())
    })
    .await?;

    tracing::info!(post_id = id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}
