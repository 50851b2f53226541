//! Limit/offset pagination.
//!
//! Without a usable `limit` the whole collection is returned as a bare
//! array; with one, the response is a [`Paginated`] envelope carrying the
//! total count and absolute links to the neighbouring pages.

use serde::{Deserialize, Serialize};
use yatube_shared::Paginated;

/// Raw query parameters. Kept as strings so that junk values fall back to
/// defaults instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl PageParams {
    /// `None` means "not paginated".
    pub fn page(&self, max_limit: i64) -> Option<Page> {
        let limit = self
            .limit
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|&n| n > 0)?
            .min(max_limit);
        let offset = self
            .offset
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|&n| n >= 0)
            .unwrap_or(0);
        Some(Page { limit, offset })
    }
}

impl Page {
    /// SQL `LIMIT`/`OFFSET` pair; `-1` lifts the limit in SQLite.
    pub fn bounds(page: Option<Page>) -> (i64, i64) {
        match page {
            Some(p) => (p.limit, p.offset),
            None => (-1, 0),
        }
    }

    fn link(base: &str, limit: i64, offset: i64) -> String {
        if offset > 0 {
            format!("{base}?limit={limit}&offset={offset}")
        } else {
            format!("{base}?limit={limit}")
        }
    }

    pub fn next(&self, base: &str, count: i64) -> Option<String> {
        let start = self.offset.saturating_add(self.limit);
        (start < count).then(|| Self::link(base, self.limit, start))
    }

    pub fn previous(&self, base: &str) -> Option<String> {
        (self.offset > 0).then(|| Self::link(base, self.limit, (self.offset - self.limit).max(0)))
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Plain(Vec<T>),
    Paged(Paginated<T>),
}

/// Wraps `results` for the response. `base` is the absolute URL of the
/// collection, without query string.
pub fn listing<T>(results: Vec<T>, count: i64, page: Option<Page>, base: &str) -> Listing<T> {
    match page {
        None => Listing::Plain(results),
        Some(page) => Listing::Paged(Paginated {
            count,
            next: page.next(base, count),
            previous: page.previous(base),
            results,
        }),
    }
}
