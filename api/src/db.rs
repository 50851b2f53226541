use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::ApiError;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

/// Opens a connection pool. `:memory:` yields a single shared in-memory
/// database, which is what the test suite runs against.
pub fn open_pool(database_url: &str) -> Result<DbPool, r2d2::Error> {
    let init = |conn: &mut Connection| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
    };

    if database_url == ":memory:" {
        r2d2::Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .build(SqliteConnectionManager::memory().with_init(init))
    } else {
        r2d2::Pool::new(SqliteConnectionManager::file(database_url).with_init(init))
    }
}

pub fn run_migrations(pool: &DbPool) -> Result<(), ApiError> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            username      TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            date_joined   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS post_groups (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            slug        TEXT UNIQUE NOT NULL,
            description TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS posts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            text        TEXT NOT NULL,
            pub_date    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            image       TEXT,
            group_id    INTEGER REFERENCES post_groups(id) ON DELETE SET NULL,
            author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_posts_group ON posts(group_id);
        CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id);

        CREATE TABLE IF NOT EXISTS comments (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            text        TEXT NOT NULL,
            created     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);

        CREATE TABLE IF NOT EXISTS follows (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            following_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            UNIQUE(user_id, following_id),
            CHECK(user_id <> following_id)
        );
        ",
    )?;

    Ok(())
}

/// Runs `f` against a pooled connection on the blocking thread pool.
pub async fn query<T, F>(pool: &DbPool, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, ApiError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        f(&conn)
    })
    .await?
}

/// Groups have no write endpoint; they are created out of band.
pub fn insert_group(
    conn: &Connection,
    title: &str,
    slug: &str,
    description: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO post_groups (title, slug, description) VALUES (?1, ?2, ?3)",
        rusqlite::params![title, slug, description],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn exists(conn: &Connection, sql: &str, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(sql, [id], |row| row.get::<_, bool>(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> DbPool {
        let pool = open_pool(":memory:").unwrap();
        run_migrations(&pool).unwrap();
        pool
    }

    #[test]
    fn migrations_are_idempotent() {
        let pool = pool();
        run_migrations(&pool).unwrap();
    }

    #[test]
    fn follow_edges_reject_self_and_duplicates() {
        let pool = pool();
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "INSERT INTO users (username, password_hash) VALUES ('a', 'x'), ('b', 'x');",
        )
        .unwrap();

        conn.execute("INSERT INTO follows (user_id, following_id) VALUES (1, 2)", [])
            .unwrap();
        assert!(conn
            .execute("INSERT INTO follows (user_id, following_id) VALUES (1, 2)", [])
            .is_err());
        assert!(conn
            .execute("INSERT INTO follows (user_id, following_id) VALUES (1, 1)", [])
            .is_err());
    }

    #[test]
    fn deleting_a_post_removes_its_comments() {
        let pool = pool();
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "INSERT INTO users (username, password_hash) VALUES ('a', 'x');
             INSERT INTO posts (text, author_id) VALUES ('hello', 1);
             INSERT INTO comments (post_id, author_id, text) VALUES (1, 1, 'hi');
             DELETE FROM posts WHERE id = 1;",
        )
        .unwrap();

        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(left, 0);
    }

    #[test]
    fn deleting_a_group_keeps_its_posts() {
        let pool = pool();
        let conn = pool.get().unwrap();
        let group = insert_group(&conn, "Cats", "cats", "").unwrap();
        conn.execute_batch("INSERT INTO users (username, password_hash) VALUES ('a', 'x');")
            .unwrap();
        conn.execute(
            "INSERT INTO posts (text, author_id, group_id) VALUES ('meow', 1, ?1)",
            [group],
        )
        .unwrap();
        conn.execute("DELETE FROM post_groups WHERE id = ?1", [group])
            .unwrap();

        let group_id: Option<i64> = conn
            .query_row("SELECT group_id FROM posts WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(group_id, None);
    }

    #[test]
    fn exists_reports_presence() {
        let pool = pool();
        let conn = pool.get().unwrap();
        let id = insert_group(&conn, "Dogs", "dogs", "woof").unwrap();
        let sql = "SELECT EXISTS(SELECT 1 FROM post_groups WHERE id = ?1)";
        assert!(exists(&conn, sql, id).unwrap());
        assert!(!exists(&conn, sql, id + 1).unwrap());
    }
}
