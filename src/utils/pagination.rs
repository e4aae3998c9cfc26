use std::collections::HashMap;

use hyper::StatusCode;
use serde::Serialize;
use tracing::warn;

use super::app_error::AppError;

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    pub page: u64,
    pub page_size: u64,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PaginationParams {
    /// Reads `page` and `page_size`. A bad `page` is a 404, a bad
    /// `page_size` falls back to the default, and sizes are capped.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, AppError> {
        let page = match params.get("page").map(|p| p.trim()) {
            None | Some("") => 1,
            Some(raw) => match raw.parse::<u64>() {
                Ok(page) if page > 0 => page,
                _ => {
                    warn!("Invalid page `{raw}`");
                    return Err(invalid_page());
                }
            },
        };

        let page_size = params
            .get("page_size")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|size| *size > 0)
            .map(|size| size.min(MAX_PAGE_SIZE))
            .unwrap_or(DEFAULT_PAGE_SIZE);

        Ok(Self { page, page_size })
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }

    pub fn window<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let len = usize::try_from(self.limit()).unwrap_or(usize::MAX);
        items.iter().skip(start).take(len).cloned().collect()
    }
}

/// One page of rows plus the total number of rows matching the query.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub count: u64,
    pub items: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub count: u64,
    pub next: Option<u64>,
    pub previous: Option<u64>,
    pub results: Vec<T>,
}

impl<T> PaginatedResponse<T> {
    /// Fails with 404 when the requested page lies past the last one.
    pub fn new(
        params: PaginationParams,
        count: u64,
        results: Vec<T>,
    ) -> Result<Self, AppError> {
        if params.page > 1 && params.offset() >= count {
            warn!("Page {} out of range ({count} rows)", params.page);
            return Err(invalid_page());
        }
        let next = (params.offset() + params.page_size < count).then_some(params.page + 1);
        let previous = (params.page > 1).then_some(params.page - 1);
        Ok(Self {
            count,
            next,
            previous,
            results,
        })
    }
}

fn invalid_page() -> AppError {
    AppError::new(StatusCode::NOT_FOUND, Some("Invalid page."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_first_page_of_ten() {
        let params = PaginationParams::from_query(&query(&[])).unwrap();
        assert_eq!(params, PaginationParams::default());
        assert_eq!(params.offset(), 0);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn page_size_is_capped() {
        let params = PaginationParams::from_query(&query(&[("page_size", "1000")])).unwrap();
        assert_eq!(params.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn garbage_page_is_not_found() {
        for raw in ["0", "-1", "abc"] {
            let err = PaginationParams::from_query(&query(&[("page", raw)])).unwrap_err();
            assert_eq!(err.status(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn next_and_previous_links() {
        let params = PaginationParams {
            page: 2,
            page_size: 10,
        };
        let page = PaginatedResponse::new(params, 25, vec![0; 10]).unwrap();
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));

        let last = PaginatedResponse::new(PaginationParams { page: 3, ..params }, 25, vec![0; 5])
            .unwrap();
        assert_eq!(last.next, None);
    }

    #[test]
    fn page_past_the_end_is_rejected() {
        let params = PaginationParams {
            page: 4,
            page_size: 10,
        };
        assert!(PaginatedResponse::<u8>::new(params, 25, vec![]).is_err());
        // An empty first page is still a valid page.
        assert!(PaginatedResponse::<u8>::new(PaginationParams::default(), 0, vec![]).is_ok());
    }

    #[test]
    fn window_slices_items() {
        let params = PaginationParams {
            page: 2,
            page_size: 2,
        };
        assert_eq!(params.window(&[1, 2, 3, 4, 5]), vec![3, 4]);
    }
}
