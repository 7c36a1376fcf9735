//! Paged listing fetcher.
//!
//! Listing endpoints signal the end of a collection inconsistently: an empty
//! page, a short page, or an `X-Total-Count` header. [`PaginatedFetcher`]
//! honours all three and caps the number of pages it will request.

use serde_json::Value;
use tracing::debug;

use crate::harvest::traits::{FetchError, ListingTransport};

/// Largest page size the registry accepts.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

pub const DEFAULT_MAX_PAGES: u32 = 1000;

/// Longest response excerpt kept in a [`FetchError::Status`].
const BODY_EXCERPT_CHARS: usize = 200;

/// Fetches every page of one logical collection.
pub struct PaginatedFetcher<'a, T: ListingTransport + ?Sized> {
    transport: &'a T,
    page_size: u32,
    max_pages: u32,
}

impl<'a, T: ListingTransport + ?Sized> PaginatedFetcher<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self {
            transport,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Sets the page size. Zero is treated as one.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the maximum number of pages fetched before giving up.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Fetches all pages of `url`, concatenated in request order.
    ///
    /// `page` and `page_size` are injected into `params` on every request,
    /// replacing any values the caller supplied for those keys.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on a transport failure, a non-2xx status, a
    /// body that is not JSON or not a list, or when the collection does not
    /// end within the page cap.
    pub async fn fetch_all(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<Value>, FetchError> {
        let mut results = Vec::new();
        let mut page: u32 = 1;
        let page_size = self.page_size as usize;

        loop {
            if page > self.max_pages {
                return Err(FetchError::PageLimitExceeded {
                    url: url.to_string(),
                    max_pages: self.max_pages,
                });
            }

            let query = self.page_query(params, page);
            let response = self.transport.get(url, &query).await.map_err(|source| {
                FetchError::Transport {
                    url: url.to_string(),
                    page,
                    source,
                }
            })?;

            if !(200..300).contains(&response.status) {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    page,
                    status: response.status,
                    body: body_excerpt(&response.body),
                });
            }

            let items = decode_page(url, page, &response.body)?;
            let count = items.len();
            results.extend(items);
            debug!(url, page, count, total = results.len(), "Fetched listing page");

            if count == 0 || count < page_size {
                break;
            }
            if response
                .total_count
                .is_some_and(|total| results.len() as u64 >= total)
            {
                break;
            }

            page += 1;
        }

        debug!(url, pages = page, total = results.len(), "Listing complete");
        Ok(results)
    }

    fn page_query(&self, params: &[(&str, &str)], page: u32) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = params
            .iter()
            .filter(|(key, _)| *key != "page" && *key != "page_size")
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        query.push(("page".to_string(), page.to_string()));
        query.push(("page_size".to_string(), self.page_size.to_string()));
        query
    }
}

/// Extracts the items of one page: a bare list, or a list under `data`.
fn decode_page(url: &str, page: u32, body: &[u8]) -> Result<Vec<Value>, FetchError> {
    let decoded: Value = serde_json::from_slice(body).map_err(|e| FetchError::Decode {
        url: url.to_string(),
        page,
        message: e.to_string(),
    })?;

    match decoded {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(FetchError::Format {
                url: url.to_string(),
                page,
                message: format!("'data' is {}, expected a list", kind_of(&other)),
            }),
            None => Err(FetchError::Format {
                url: url.to_string(),
                page,
                message: "object without a 'data' list".to_string(),
            }),
        },
        other => Err(FetchError::Format {
            url: url.to_string(),
            page,
            message: format!("body is {}, expected a list", kind_of(&other)),
        }),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn body_excerpt(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(BODY_EXCERPT_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}
