use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Raw pagination query parameters as they arrive on a list endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Validated limit/offset pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageParams {
    pub limit: i64,
    pub offset: i64,
}

/// Pagination metadata computed for a response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub page: i64,
    pub page_count: i64,
    pub has_more: bool,
    pub has_previous: bool,
}

impl PageMeta {
    /// Build metadata for a page of `limit` items starting at `offset`
    /// out of `total`. Pure arithmetic, no I/O.
    pub fn build(total: i64, limit: i64, offset: i64) -> Self {
        let limit = limit.max(1);
        let total = total.max(0);
        let offset = offset.max(0);

        Self {
            total,
            page: offset / limit + 1,
            page_count: (total + limit - 1) / limit,
            has_more: offset + limit < total,
            has_previous: offset > 0,
        }
    }
}

/// Clamps incoming limit/offset pairs into a valid range.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    default_limit: i64,
    max_limit: i64,
}

impl Paginator {
    pub fn new(default_limit: i64, max_limit: i64) -> Self {
        Self {
            default_limit: default_limit.max(1),
            max_limit: max_limit.max(1),
        }
    }

    /// Clamp `limit` into `[1, max_limit]`, falling back to the default
    /// when absent or non-positive, and `offset` to `>= 0`.
    pub fn validate(&self, limit: Option<i64>, offset: Option<i64>) -> PageParams {
        let limit = match limit {
            Some(value) if value > 0 => value.min(self.max_limit),
            _ => self.default_limit,
        };
        let offset = offset.unwrap_or(0).max(0);

        PageParams { limit, offset }
    }

    pub fn validate_query(&self, query: PageQuery) -> PageParams {
        self.validate(query.limit, query.offset)
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, MAX_LIMIT)
    }
}
