use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::MAX_PAGE_SIZE,
};

/// Pagination
///
/// A validated page window: 1-based page number and a page size in
/// `1..=MAX_PAGE_SIZE`. Repositories consume it as LIMIT/OFFSET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    /// Resolves the raw query parameters. Page 0 is rejected like any page past the end.
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: u32) -> AppResult<Self> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::not_found("Invalid page."));
        }
        let page_size = page_size.unwrap_or(default_size).clamp(1, MAX_PAGE_SIZE);
        Ok(Self { page, page_size })
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

/// Page
///
/// Envelope returned by every list endpoint. `next`/`previous` are page numbers,
/// `null` at either end.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Wraps one window of results. A non-empty request past the last page is a 404;
    /// the first page of an empty collection is not.
    pub fn new(results: Vec<T>, count: i64, window: Pagination) -> AppResult<Self> {
        if window.page > 1 && window.offset() >= count {
            return Err(AppError::not_found("Invalid page."));
        }
        let next = (window.offset() + window.limit() < count).then_some(window.page + 1);
        let previous = (window.page > 1).then_some(window.page - 1);
        Ok(Self {
            count,
            next,
            previous,
            results,
        })
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}
