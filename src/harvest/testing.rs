//! In-memory listing transport for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::harvest::traits::{ListingResponse, ListingTransport, TransportError};

/// `count` objects named `{prefix}{start}..`.
pub fn items(prefix: &str, start: usize, count: usize) -> Vec<Value> {
    (start..start + count)
        .map(|i| json!({ "name": format!("{}{}", prefix, i) }))
        .collect()
}

#[derive(Debug, Clone)]
enum Behavior {
    /// Page `n` answers with `bodies[n - 1]`, later pages with `[]`
    Bodies(Vec<Value>),
    Raw(Vec<u8>),
    Status(u16, String),
    Unreachable(String),
    Endless(usize),
}

#[derive(Debug, Clone)]
pub struct Route {
    behavior: Behavior,
    total: Option<u64>,
}

impl Route {
    pub fn pages(pages: Vec<Vec<Value>>) -> Self {
        Self::bodies(pages.into_iter().map(Value::Array).collect())
    }

    pub fn bodies(bodies: Vec<Value>) -> Self {
        Self {
            behavior: Behavior::Bodies(bodies),
            total: None,
        }
    }

    pub fn raw(body: Vec<u8>) -> Self {
        Self {
            behavior: Behavior::Raw(body),
            total: None,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            behavior: Behavior::Status(status, body.to_string()),
            total: None,
        }
    }

    pub fn unreachable(message: &str) -> Self {
        Self {
            behavior: Behavior::Unreachable(message.to_string()),
            total: None,
        }
    }

    /// Every page is full, forever.
    pub fn endless(per_page: usize) -> Self {
        Self {
            behavior: Behavior::Endless(per_page),
            total: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }
}

/// Serves canned pages per URL and records every request.
#[derive(Debug, Default)]
pub struct FakeTransport {
    routes: HashMap<String, Route>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, route: Route) -> Self {
        self.routes.insert(url.to_string(), route);
        self
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.queries(url).len()
    }

    pub fn queries(&self, url: &str) -> Vec<Vec<(String, String)>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(requested, _)| requested == url)
            .map(|(_, query)| query.clone())
            .collect()
    }

    /// Requested URLs in order.
    pub fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }
}

fn ok(body: Vec<u8>, total: Option<u64>) -> Result<ListingResponse, TransportError> {
    Ok(ListingResponse {
        status: 200,
        total_count: total,
        body,
    })
}

#[async_trait]
impl ListingTransport for FakeTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<ListingResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), query.to_vec()));

        let page: usize = query
            .iter()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(1);

        let Some(route) = self.routes.get(url) else {
            return Ok(ListingResponse {
                status: 404,
                total_count: None,
                body: br#"{"errors":[{"code":"NOT_FOUND"}]}"#.to_vec(),
            });
        };

        match &route.behavior {
            Behavior::Bodies(bodies) => {
                let body = bodies.get(page - 1).cloned().unwrap_or_else(|| json!([]));
                ok(serde_json::to_vec(&body).unwrap(), route.total)
            }
            Behavior::Raw(body) => ok(body.clone(), route.total),
            Behavior::Status(status, body) => Ok(ListingResponse {
                status: *status,
                total_count: None,
                body: body.clone().into_bytes(),
            }),
            Behavior::Unreachable(message) => Err(TransportError::new(message.clone())),
            Behavior::Endless(per_page) => {
                let body = Value::Array(items("item", (page - 1) * per_page, *per_page));
                ok(serde_json::to_vec(&body).unwrap(), route.total)
            }
        }
    }
}
