use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use yatube_shared::{AccessToken, Credentials, TokenPair, TokenRefresh, TokenVerify, User};

use crate::{
    db,
    error::{is_unique_violation, push_error, ApiError, FieldErrors, BLANK, REQUIRED},
    AppState,
};

const MAX_USERNAME_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 8;

// ── JWT Claims ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64, // user id
    pub iat: i64,
    pub exp: i64,
    pub token_type: TokenType,
}

pub fn issue_token(
    user_id: i64,
    token_type: TokenType,
    ttl: Duration,
    secret: &str,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
        token_type,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token encoding: {e}")))
}

/// Decodes and validates `token`. When `expected` is given the token must be
/// of that type.
pub fn decode_token(
    token: &str,
    secret: &str,
    expected: Option<TokenType>,
) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected token");
        ApiError::InvalidToken
    })?;

    match expected {
        Some(kind) if data.claims.token_type != kind => Err(ApiError::InvalidToken),
        _ => Ok(data.claims),
    }
}

// ── Password hashing ──

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing: {e}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| ApiError::Internal(format!("stored password hash: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ApiError::Internal(format!("password verification: {e}"))),
    }
}

// ── Request identity ──

/// The caller behind a valid access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

/// Optional identity of the caller. Absent or non-Bearer `Authorization`
/// headers mean an anonymous caller; a Bearer token that does not resolve
/// to an existing user rejects the request with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<AuthUser>);

impl CurrentUser {
    pub fn get(&self) -> Option<&AuthUser> {
        self.0.as_ref()
    }

    pub fn required(self) -> Result<AuthUser, ApiError> {
        self.0.ok_or(ApiError::NotAuthenticated)
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        else {
            return Ok(CurrentUser(None));
        };

        let claims = decode_token(
            token.trim(),
            &state.config.jwt_secret,
            Some(TokenType::Access),
        )?;

        let user_id = claims.sub;
        let user = db::query(&state.db, move |conn| {
            conn.query_row(
                "SELECT id, username FROM users WHERE id = ?1",
                [user_id],
                |row| {
                    Ok(AuthUser {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => ApiError::InvalidToken,
                other => other.into(),
            })
        })
        .await?;

        Ok(CurrentUser(Some(user)))
    }
}

// ── Validation ──

fn valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

/// Checks registration input, returning the trimmed username and password.
pub fn validate_registration(creds: Credentials) -> Result<(String, String), ApiError> {
    let mut errors = FieldErrors::new();

    let username = match creds.username.map(|u| u.trim().to_string()) {
        None => {
            push_error(&mut errors, "username", REQUIRED);
            None
        }
        Some(u) if u.is_empty() => {
            push_error(&mut errors, "username", BLANK);
            None
        }
        Some(u) => {
            if u.chars().count() > MAX_USERNAME_LEN {
                push_error(
                    &mut errors,
                    "username",
                    format!("Ensure this field has no more than {MAX_USERNAME_LEN} characters."),
                );
            }
            if !valid_username(&u) {
                push_error(
                    &mut errors,
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            }
            Some(u)
        }
    };

    let password = match creds.password {
        None => {
            push_error(&mut errors, "password", REQUIRED);
            None
        }
        Some(p) if p.is_empty() => {
            push_error(&mut errors, "password", BLANK);
            None
        }
        Some(p) => {
            if p.chars().count() < MIN_PASSWORD_LEN {
                push_error(
                    &mut errors,
                    "password",
                    format!(
                        "This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."
                    ),
                );
            }
            if p.chars().all(|c| c.is_ascii_digit()) {
                push_error(&mut errors, "password", "This password is entirely numeric.");
            }
            Some(p)
        }
    };

    match (username, password) {
        (Some(u), Some(p)) if errors.is_empty() => Ok((u, p)),
        _ => Err(ApiError::Validation(errors)),
    }
}

fn required_field(value: Option<String>, name: &str) -> Result<String, ApiError> {
    match value {
        None => Err(ApiError::field(name, REQUIRED)),
        Some(v) if v.is_empty() => Err(ApiError::field(name, BLANK)),
        Some(v) => Ok(v),
    }
}

const USERNAME_TAKEN: &str = "A user with that username already exists.";

/// Inserts a user row and returns its id. A username claimed concurrently
/// is reported like any other duplicate.
pub fn insert_user(conn: &Connection, username: &str, password_hash: &str) -> Result<i64, ApiError> {
    match conn.execute(
        "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
        rusqlite::params![username, password_hash],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => Err(ApiError::field("username", USERNAME_TAKEN)),
        Err(e) => Err(e.into()),
    }
}

// ── Handlers ──

/// POST /v1/users/: register an account
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(creds) = payload?;
    let (username, password) = validate_registration(creds)?;

    let user = db::query(&state.db, move |conn| {
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            [&username],
            |row| row.get(0),
        )?;
        if taken {
            return Err(ApiError::field("username", USERNAME_TAKEN));
        }

        let hash = hash_password(&password)?;
        let id = insert_user(conn, &username, &hash)?;
        Ok(User { id, username })
    })
    .await?;

    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /v1/users/me/
pub async fn me(current: CurrentUser) -> Result<Json<User>, ApiError> {
    let user = current.required()?;
    Ok(Json(User {
        id: user.id,
        username: user.username,
    }))
}

/// POST /v1/jwt/create/: exchange credentials for an access/refresh pair
pub async fn create_token(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(creds) = payload?;
    let username = required_field(creds.username, "username")?;
    let password = required_field(creds.password, "password")?;

    let user_id = db::query(&state.db, move |conn| {
        let row = conn.query_row(
            "SELECT id, password_hash FROM users WHERE username = ?1",
            [&username],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        );
        let (id, hash) = match row {
            Ok(found) => found,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Err(ApiError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };

        if verify_password(&password, &hash)? {
            Ok(id)
        } else {
            Err(ApiError::InvalidCredentials)
        }
    })
    .await
    .inspect_err(|e| {
        if matches!(e, ApiError::InvalidCredentials) {
            tracing::debug!("login failed");
        }
    })?;

    let cfg = &state.config;
    Ok(Json(TokenPair {
        access: issue_token(user_id, TokenType::Access, cfg.access_token_ttl, &cfg.jwt_secret)?,
        refresh: issue_token(user_id, TokenType::Refresh, cfg.refresh_token_ttl, &cfg.jwt_secret)?,
    }))
}

/// POST /v1/jwt/refresh/: mint a new access token from a refresh token
pub async fn refresh_token(
    State(state): State<AppState>,
    payload: Result<Json<TokenRefresh>, JsonRejection>,
) -> Result<Json<AccessToken>, ApiError> {
    let Json(body) = payload?;
    let refresh = required_field(body.refresh, "refresh")?;
    let cfg = &state.config;

    let claims = decode_token(&refresh, &cfg.jwt_secret, Some(TokenType::Refresh))?;
    let access = issue_token(claims.sub, TokenType::Access, cfg.access_token_ttl, &cfg.jwt_secret)?;
    Ok(Json(AccessToken { access }))
}

/// POST /v1/jwt/verify/: 200 with an empty object when the token is valid
pub async fn verify_token(
    State(state): State<AppState>,
    payload: Result<Json<TokenVerify>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    let token = required_field(body.token, "token")?;
    decode_token(&token, &state.config.jwt_secret, None)?;
    Ok(Json(json!({})))
}
