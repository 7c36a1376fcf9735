//! Trait seams and error types for the harvest stages.
//!
//! - Registry access via [`ListingTransport`]
//! - Runtime listing via [`CommandSource`]
//! - Table inference via [`TableParser`]

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{IgnoreSet, ParsedTableRow};

// ============================================================================
// Registry Transport
// ============================================================================

/// One raw HTTP response from a listing endpoint.
#[derive(Debug, Clone)]
pub struct ListingResponse {
    /// HTTP status code
    pub status: u16,

    /// Value of the `X-Total-Count` header, when present and numeric
    pub total_count: Option<u64>,

    /// Undecoded response body
    pub body: Vec<u8>,
}

/// Performs GET requests against listing endpoints.
///
/// Implementations carry the credentials and TLS settings and apply them to
/// every call. A non-2xx status is a successful transport round trip; only
/// connection-level problems are [`TransportError`]s.
#[async_trait]
pub trait ListingTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<ListingResponse, TransportError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure fetching one logical collection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection refused, timeout, TLS failure
    #[error("Request to {url} (page {page}) failed: {source}")]
    Transport {
        url: String,
        page: u32,
        #[source]
        source: TransportError,
    },

    /// Non-2xx response
    #[error("{url} (page {page}) returned HTTP {status}: {body}")]
    Status {
        url: String,
        page: u32,
        status: u16,
        body: String,
    },

    /// Body is not JSON
    #[error("Failed to decode JSON from {url} (page {page}): {message}")]
    Decode {
        url: String,
        page: u32,
        message: String,
    },

    /// Body is JSON but neither a list nor an object with a list under `data`
    #[error("Unexpected response format from {url} (page {page}): {message}")]
    Format {
        url: String,
        page: u32,
        message: String,
    },

    #[error("Pagination of {url} did not terminate within {max_pages} pages")]
    PageLimitExceeded { url: String, max_pages: u32 },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Transport { url, .. }
            | Self::Status { url, .. }
            | Self::Decode { url, .. }
            | Self::Format { url, .. }
            | Self::PageLimitExceeded { url, .. } => url,
        }
    }
}

// ============================================================================
// Runtime Command
// ============================================================================

/// Produces the runtime's image table as text.
#[async_trait]
pub trait CommandSource: Send + Sync {
    /// Runs the command to completion and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] if the executable is missing, cannot be
    /// spawned, or exits non-zero.
    async fn run(&self) -> Result<String, ProcessError>;

    /// Human-readable command line, used in logs.
    fn describe(&self) -> String;
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Command not found: {program}")]
    NotFound { program: String },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {stderr}", exit_code_label(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

// ============================================================================
// Table Parsing
// ============================================================================

/// Why a table header was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderDiagnostic {
    #[error("column label '{label}' not found in header '{header}'")]
    MissingLabel { label: String, header: String },

    #[error("column labels out of order in header '{header}' (offsets {offsets:?})")]
    MisorderedLabels {
        header: String,
        offsets: [usize; 3],
    },
}

/// Result of parsing one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    pub rows: Vec<ParsedTableRow>,

    /// Rows dropped because their identifier is ignored
    pub ignored: usize,

    /// Set when the header was unusable; `rows` is then empty
    pub diagnostic: Option<HeaderDiagnostic>,
}

/// Turns tabular text into rows. Never fails: anomalies degrade to an empty
/// or shorter result.
pub trait TableParser: Send + Sync {
    fn parse(&self, text: &str, ignore: &IgnoreSet) -> ParsedTable;

    fn parser_name(&self) -> &'static str;
}
