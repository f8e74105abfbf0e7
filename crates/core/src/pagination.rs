//! Page requests and paged results shared by every list endpoint.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Columns a list may be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Id,
    CreatedAt,
    UpdatedAt,
    Name,
}

impl SortKey {
    pub fn column(self) -> &'static str {
        match self {
            SortKey::Id => "id",
            SortKey::CreatedAt => "created_at",
            SortKey::UpdatedAt => "updated_at",
            SortKey::Name => "name",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "id" => Some(SortKey::Id),
            "created_at" => Some(SortKey::CreatedAt),
            "updated_at" => Some(SortKey::UpdatedAt),
            "name" => Some(SortKey::Name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Sort applied when a query names no column or direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDefaults {
    pub sort: SortKey,
    pub order: SortOrder,
}

impl PageDefaults {
    pub const NEWEST_FIRST: Self = Self {
        sort: SortKey::CreatedAt,
        order: SortOrder::Desc,
    };

    /// Ids are UUIDv7, so this is creation order.
    pub const BY_ID: Self = Self {
        sort: SortKey::Id,
        order: SortOrder::Asc,
    };
}

/// Normalized pagination input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            sort: PageDefaults::NEWEST_FIRST.sort,
            order: PageDefaults::NEWEST_FIRST.order,
        }
    }
}

impl PageRequest {
    /// Builds a request from raw query values.
    ///
    /// Out-of-range `page`/`limit` are clamped; an unknown `sort` column or
    /// `order` keyword is a validation error. Missing `sort`/`order` fall back
    /// to `defaults`.
    pub fn parse(
        defaults: PageDefaults,
        page: Option<u32>,
        limit: Option<u32>,
        sort: Option<&str>,
        order: Option<&str>,
    ) -> Result<Self, DomainError> {
        let page = page.filter(|p| *p >= 1).unwrap_or(DEFAULT_PAGE);
        let limit = match limit {
            None | Some(0) => DEFAULT_LIMIT,
            Some(l) => l.min(MAX_LIMIT),
        };

        let sort = match sort.map(str::trim).filter(|s| !s.is_empty()) {
            None => defaults.sort,
            Some(raw) => SortKey::parse(raw).ok_or_else(|| {
                DomainError::invalid_field("sort", format!("cannot sort by '{raw}'"))
            })?,
        };

        let order = match order.map(|o| o.trim().to_ascii_lowercase()) {
            None => defaults.order,
            Some(o) if o.is_empty() => defaults.order,
            Some(o) if o == "desc" => SortOrder::Desc,
            Some(o) if o == "asc" => SortOrder::Asc,
            Some(_) => {
                return Err(DomainError::invalid_field(
                    "order",
                    "order must be 'asc' or 'desc'",
                ));
            }
        };

        Ok(Self {
            page,
            limit,
            sort,
            order,
        })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Wraps a fetched window with metadata computed from `total_rows`.
    pub fn page_of<T>(&self, items: Vec<T>, total_rows: u64) -> Page<T> {
        Page {
            items,
            meta: PageMeta::new(self, total_rows),
        }
    }

    /// Slices an already sorted, fully materialized list.
    pub fn slice<T>(&self, all: Vec<T>) -> Page<T> {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.limit as usize)
            .collect();
        self.page_of(items, total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub sort: SortKey,
    pub order: SortOrder,
    pub total_rows: u64,
    pub total_pages: u64,
}

impl PageMeta {
    pub fn new(req: &PageRequest, total_rows: u64) -> Self {
        Self {
            page: req.page,
            limit: req.limit,
            sort: req.sort,
            order: req.order,
            total_rows,
            total_pages: total_rows.div_ceil(u64::from(req.limit)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_apply_when_nothing_given() {
        let req = PageRequest::parse(PageDefaults::NEWEST_FIRST, None, None, None, None).unwrap();
        assert_eq!(req, PageRequest::default());
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn limit_is_capped_and_zero_page_clamped() {
        let req = PageRequest::parse(PageDefaults::NEWEST_FIRST, Some(0), Some(500), Some("name"), Some("ASC")).unwrap();
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, MAX_LIMIT);
        assert_eq!(req.sort, SortKey::Name);
        assert_eq!(req.order, SortOrder::Asc);
    }

    #[test]
    fn unknown_sort_column_is_rejected() {
        let err = PageRequest::parse(PageDefaults::BY_ID, None, None, Some("password_hash"), None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn id_sort_and_listing_defaults() {
        let req = PageRequest::parse(PageDefaults::BY_ID, None, None, None, None).unwrap();
        assert_eq!((req.sort, req.order), (SortKey::Id, SortOrder::Asc));

        let req =
            PageRequest::parse(PageDefaults::NEWEST_FIRST, None, None, Some("id"), Some("")).unwrap();
        assert_eq!((req.sort, req.order), (SortKey::Id, SortOrder::Desc));
        assert_eq!(req.sort.column(), "id");
    }

    #[test]
    fn unknown_order_is_rejected() {
        assert!(PageRequest::parse(PageDefaults::BY_ID, None, None, None, Some("sideways")).is_err());
    }

    #[test]
    fn slice_returns_requested_window() {
        let req = PageRequest::parse(PageDefaults::NEWEST_FIRST, Some(2), Some(3), None, None).unwrap();
        let page = req.slice((0..8).collect::<Vec<_>>());
        assert_eq!(page.items, vec![3, 4, 5]);
        assert_eq!(page.meta.total_rows, 8);
        assert_eq!(page.meta.total_pages, 3);
    }

    proptest! {
        #[test]
        fn total_pages_covers_all_rows(total in 0u64..10_000, limit in 1u32..=100) {
            let req = PageRequest { limit, ..PageRequest::default() };
            let meta = PageMeta::new(&req, total);
            prop_assert!(meta.total_pages * u64::from(limit) >= total);
            if meta.total_pages > 0 {
                prop_assert!((meta.total_pages - 1) * u64::from(limit) < total);
            }
        }

        #[test]
        fn slice_never_exceeds_limit(len in 0usize..300, page in 1u32..20, limit in 1u32..=100) {
            let req = PageRequest { page, limit, ..PageRequest::default() };
            let page = req.slice(vec![(); len]);
            prop_assert!(page.items.len() <= limit as usize);
            prop_assert_eq!(page.meta.total_rows, len as u64);
        }
    }
}
