use axum::{
    extract::{rejection::PathRejection, OriginalUri, Path, Query, State},
    Json,
};
use yatube_shared::Group;

use crate::{
    auth::CurrentUser,
    db,
    error::ApiError,
    pagination::{listing, Listing, Page, PageParams},
    serializers::{group_from_row, GROUP_COLUMNS},
    AppState,
};

/// GET /v1/groups/?limit=&offset=
pub async fn list_groups(
    State(state): State<AppState>,
    _current: CurrentUser,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> Result<Json<Listing<Group>>, ApiError> {
    let page = params.page(state.config.max_page_limit);
    let (limit, offset) = Page::bounds(page);

    let (groups, count) = db::query(&state.db, move |conn| {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM post_groups", [], |row| row.get(0))?;

        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM post_groups g ORDER BY g.id LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let groups = stmt
            .query_map([limit, offset], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((groups, count))
    })
    .await?;

    let base = format!("{}{}", state.config.api_url, uri.path());
    Ok(Json(listing(groups, count, page, &base)))
}

/// GET /v1/groups/{id}/
pub async fn get_group(
    State(state): State<AppState>,
    _current: CurrentUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Group>, ApiError> {
    let Path(id) = path?;

    let group = db::query(&state.db, move |conn| {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM post_groups g WHERE g.id = ?1");
        Ok(conn.query_row(&sql, [id], group_from_row)?)
    })
    .await?;

    Ok(Json(group))
}
