//! Row ↔ wire mapping and field-level validation of incoming payloads.
//!
//! Server-assigned fields (`id`, `author`, `user`, `post`, timestamps) never
//! come from the payload types, so clients cannot set them.

use rusqlite::{Connection, Row};
use yatube_shared::{Comment, CommentPayload, CreateFollow, Follow, Group, Post, PostPayload};

use crate::{
    auth::AuthUser,
    db,
    error::{
        is_unique_violation, push_error, ApiError, FieldErrors, BLANK, NON_FIELD, NULL, REQUIRED,
    },
};

// ── Row mapping ──

pub const GROUP_COLUMNS: &str = "g.id, g.title, g.slug, g.description";

/// Post columns followed by the author id, which the permission check needs.
pub const POST_COLUMNS: &str =
    "p.id, u.username, p.text, p.pub_date, p.image, p.group_id, p.author_id";

pub const COMMENT_COLUMNS: &str =
    "c.id, u.username, c.post_id, c.text, c.created, c.author_id";

pub fn group_from_row(row: &Row) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
    })
}

pub fn post_from_row(row: &Row) -> rusqlite::Result<(Post, i64)> {
    let post = Post {
        id: row.get(0)?,
        author: row.get(1)?,
        text: row.get(2)?,
        pub_date: row.get(3)?,
        image: row.get(4)?,
        group: row.get(5)?,
    };
    Ok((post, row.get(6)?))
}

pub fn comment_from_row(row: &Row) -> rusqlite::Result<(Comment, i64)> {
    let comment = Comment {
        id: row.get(0)?,
        author: row.get(1)?,
        post: row.get(2)?,
        text: row.get(3)?,
        created: row.get(4)?,
    };
    Ok((comment, row.get(5)?))
}

pub fn follow_from_row(row: &Row) -> rusqlite::Result<Follow> {
    Ok(Follow {
        user: row.get(0)?,
        following: row.get(1)?,
    })
}

// ── Validation ──

/// Returns the text as sent. Text that renders to nothing once every tag is
/// stripped counts as blank.
fn check_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<Option<String>>,
    required: bool,
) -> Option<String> {
    match value {
        None => {
            if required {
                push_error(errors, field, REQUIRED);
            }
            None
        }
        Some(None) => {
            push_error(errors, field, NULL);
            None
        }
        Some(Some(raw)) => {
            let rendered = ammonia::Builder::empty().clean(&raw).to_string();
            if rendered.trim().is_empty() {
                push_error(errors, field, BLANK);
                None
            } else {
                Some(raw)
            }
        }
    }
}

fn finish<T>(errors: FieldErrors, value: T) -> Result<T, ApiError> {
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Validated post fields; `None` leaves the stored value untouched.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PostChanges {
    pub text: Option<String>,
    pub image: Option<Option<String>>,
    pub group: Option<Option<i64>>,
}

/// `partial` is true for PATCH, where `text` may be omitted.
pub fn validate_post(
    conn: &Connection,
    payload: PostPayload,
    partial: bool,
) -> Result<PostChanges, ApiError> {
    let mut errors = FieldErrors::new();

    let text = check_text(&mut errors, "text", payload.text, !partial);

    let image = payload
        .image
        .map(|image| image.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));

    let group = match payload.group {
        Some(Some(id)) => {
            let found = db::exists(
                conn,
                "SELECT EXISTS(SELECT 1 FROM post_groups WHERE id = ?1)",
                id,
            )?;
            if !found {
                push_error(
                    &mut errors,
                    "group",
                    format!("Invalid pk \"{id}\" - object does not exist."),
                );
            }
            Some(Some(id))
        }
        other => other,
    };

    finish(errors, PostChanges { text, image, group })
}

pub fn validate_comment(payload: CommentPayload, partial: bool) -> Result<Option<String>, ApiError> {
    let mut errors = FieldErrors::new();
    let text = check_text(&mut errors, "text", payload.text, !partial);
    finish(errors, text)
}

const FOLLOW_NOT_UNIQUE: &str = "The fields user, following must make a unique set.";

/// Resolves the followed user for `user`, returning their id and username.
pub fn validate_follow(
    conn: &Connection,
    payload: CreateFollow,
    user: &AuthUser,
) -> Result<(i64, String), ApiError> {
    let username = match payload.following.map(|s| s.trim().to_string()) {
        None => return Err(ApiError::field("following", REQUIRED)),
        Some(s) if s.is_empty() => return Err(ApiError::field("following", BLANK)),
        Some(s) => s,
    };

    let following_id = match conn.query_row(
        "SELECT id FROM users WHERE username = ?1",
        [&username],
        |row| row.get::<_, i64>(0),
    ) {
        Ok(id) => id,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(ApiError::field(
                "following",
                format!("Object with username={username} does not exist."),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    if following_id == user.id {
        return Err(ApiError::field("following", "You cannot follow yourself."));
    }

    let already: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM follows WHERE user_id = ?1 AND following_id = ?2)",
        [user.id, following_id],
        |row| row.get(0),
    )?;
    if already {
        return Err(ApiError::field(NON_FIELD, FOLLOW_NOT_UNIQUE));
    }

    Ok((following_id, username))
}

/// Stores a validated follow edge. An edge created concurrently after
/// [`validate_follow`] ran is reported as the same duplicate error.
pub fn insert_follow(conn: &Connection, user_id: i64, following_id: i64) -> Result<(), ApiError> {
    match conn.execute(
        "INSERT INTO follows (user_id, following_id) VALUES (?1, ?2)",
        [user_id, following_id],
    ) {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(ApiError::field(NON_FIELD, FOLLOW_NOT_UNIQUE)),
        Err(e) => Err(e.into()),
    }
}
