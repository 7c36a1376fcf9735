//! Local runtime harvest pipeline.
//!
//! This module provides the [`LocalInventoryPipeline`] coordinator that runs
//! the runtime's listing command and parses its table output with:
//! - Async execution via `tokio`
//! - A hard wall-clock timeout on the command stage
//! - Structured logging via `tracing`

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::harvest::table::ColumnarTextParser;
use crate::harvest::traits::{CommandSource, HeaderDiagnostic, ProcessError, TableParser};
use crate::model::{IgnoreSet, ImageRecord, SourceInventory};
use crate::traits::{InventorySource, SourceError};

// ============================================================================
// External Command
// ============================================================================

/// A program plus arguments whose stdout is the image table.
///
/// The spawned process is killed when its future is dropped, which is how a
/// stage timeout ends it. Processes it started itself are not signalled.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds a command from a full argv. Returns `None` for an empty argv.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }

    /// `sudo crictl images`; crictl usually needs root.
    ///
    /// A stage timeout kills only the direct child, here `sudo`. The `crictl`
    /// it started runs as root and may outlive the timeout until it exits on
    /// its own.
    pub fn crictl_images() -> Self {
        Self::new("sudo", ["crictl", "images"])
    }
}

#[async_trait]
impl CommandSource for ExternalCommand {
    async fn run(&self) -> Result<String, ProcessError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    ProcessError::NotFound {
                        program: self.program.clone(),
                    }
                } else {
                    ProcessError::Spawn {
                        program: self.program.clone(),
                        source,
                    }
                }
            })?;

        if !output.status.success() {
            return Err(ProcessError::Failed {
                program: self.describe(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================================================================
// Pipeline Types
// ============================================================================

/// Complete local harvest result with records and statistics.
#[derive(Debug, Clone)]
pub struct LocalHarvest {
    pub images: Vec<ImageRecord>,

    /// Why the table header was rejected, if it was
    pub diagnostic: Option<HeaderDiagnostic>,

    pub stats: HarvestStats,
}

/// Statistics about the harvest operation.
#[derive(Debug, Default, Clone)]
pub struct HarvestStats {
    /// Total time spent on entire harvest (milliseconds)
    pub total_duration_ms: u64,

    /// Time spent waiting on the command (milliseconds)
    pub command_duration_ms: u64,

    /// Time spent parsing its output (milliseconds)
    pub parse_duration_ms: u64,

    /// Rows emitted
    pub rows_parsed: usize,

    /// Rows dropped by the ignore list
    pub rows_ignored: usize,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that can occur during pipeline execution.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Stage execution exceeded timeout
    #[error("Stage '{stage}' timed out after {timeout_secs}s")]
    StageTimeout { stage: String, timeout_secs: u64 },

    /// The listing command failed
    #[error("Command failed: {0}")]
    CommandFailed(#[from] ProcessError),
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Runs a [`CommandSource`] under a timeout and parses its output.
///
/// # Example
///
/// ```ignore
/// let pipeline = LocalInventoryPipeline::new(ExternalCommand::crictl_images(), ColumnarTextParser::default())
///     .with_timeout(Duration::from_secs(30));
///
/// let harvest = pipeline.execute(&ignore).await?;
/// println!("Found {} local images", harvest.images.len());
/// ```
pub struct LocalInventoryPipeline<S = ExternalCommand, P = ColumnarTextParser>
where
    S: CommandSource,
    P: TableParser,
{
    /// Produces the raw table
    command: S,

    /// Turns the table into rows
    parser: P,

    /// Hard bound on the command stage (default: 30 seconds)
    stage_timeout: Duration,

    /// Identifiers dropped from the output when run as an [`InventorySource`]
    ignore: Arc<IgnoreSet>,
}

impl<S, P> LocalInventoryPipeline<S, P>
where
    S: CommandSource,
    P: TableParser,
{
    /// Creates a new pipeline with the given command and parser.
    ///
    /// Default configuration:
    /// - Timeout: 30 seconds
    /// - Ignore set: empty
    pub fn new(command: S, parser: P) -> Self {
        Self {
            command,
            parser,
            stage_timeout: Duration::from_secs(30),
            ignore: Arc::new(IgnoreSet::new()),
        }
    }

    /// Sets the timeout for the command stage.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Sets the ignore set used by [`InventorySource::collect`].
    pub fn with_ignore_set(mut self, ignore: Arc<IgnoreSet>) -> Self {
        self.ignore = ignore;
        self
    }

    /// Runs the command and parses its output, dropping rows in `ignore`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if:
    /// - The command exceeds the stage timeout (it is killed)
    /// - The command is missing, cannot start, or exits non-zero
    ///
    /// An unusable table is not an error: the result is empty and carries a
    /// [`HeaderDiagnostic`].
    pub async fn execute(&self, ignore: &IgnoreSet) -> Result<LocalHarvest, PipelineError> {
        let start = Instant::now();
        let mut stats = HarvestStats::default();

        // ====================================================================
        // Stage 1: Command
        // ====================================================================

        let command_line = self.command.describe();
        info!(command = %command_line, "Starting command stage");

        // Dropping the future on timeout kills the child (kill_on_drop).
        let output = timeout(self.stage_timeout, self.command.run())
            .await
            .map_err(|_| PipelineError::StageTimeout {
                stage: command_line.clone(),
                timeout_secs: self.stage_timeout.as_secs(),
            })??;

        stats.command_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            duration_ms = stats.command_duration_ms,
            bytes = output.len(),
            "Command completed"
        );

        // ====================================================================
        // Stage 2: Parsing
        // ====================================================================

        let parse_start = Instant::now();
        let table = self.parser.parse(&output, ignore);

        if let Some(diagnostic) = &table.diagnostic {
            warn!(
                parser = self.parser.parser_name(),
                %diagnostic,
                "Runtime table could not be parsed, reporting no local images"
            );
        }

        stats.parse_duration_ms = parse_start.elapsed().as_millis() as u64;
        stats.rows_parsed = table.rows.len();
        stats.rows_ignored = table.ignored;
        stats.total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            rows = stats.rows_parsed,
            ignored = stats.rows_ignored,
            duration_ms = stats.total_duration_ms,
            "Local harvest completed"
        );

        Ok(LocalHarvest {
            images: table.rows.into_iter().map(ImageRecord::from).collect(),
            diagnostic: table.diagnostic,
            stats,
        })
    }
}

#[async_trait]
impl<S, P> InventorySource for LocalInventoryPipeline<S, P>
where
    S: CommandSource,
    P: TableParser,
{
    fn source_id(&self) -> &str {
        "containerd"
    }

    #[instrument(skip(self))]
    async fn collect(&self) -> Result<SourceInventory, SourceError> {
        let harvest = self.execute(&self.ignore).await?;
        Ok(SourceInventory {
            images: harvest.images,
            failures: Vec::new(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
REPOSITORY   TAG      IMAGE ID     SIZE
nginx        latest   abc123       10MB
redis        7        def456       30MB
";

    // Mock command for testing
    struct MockCommand {
        output: Result<String, fn() -> ProcessError>,
        delay: Duration,
    }

    impl MockCommand {
        fn ok(output: &str) -> Self {
            Self {
                output: Ok(output.to_string()),
                delay: Duration::ZERO,
            }
        }

        fn failing(error: fn() -> ProcessError) -> Self {
            Self {
                output: Err(error),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl CommandSource for MockCommand {
        async fn run(&self) -> Result<String, ProcessError> {
            tokio::time::sleep(self.delay).await;
            match &self.output {
                Ok(output) => Ok(output.clone()),
                Err(make) => Err(make()),
            }
        }

        fn describe(&self) -> String {
            "mock images".to_string()
        }
    }

    #[tokio::test]
    async fn test_pipeline_execution() {
        let pipeline = LocalInventoryPipeline::new(MockCommand::ok(TABLE), ColumnarTextParser::default());

        let harvest = pipeline.execute(&IgnoreSet::new()).await.unwrap();

        assert_eq!(harvest.images.len(), 2);
        assert_eq!(harvest.images[0].repository, "nginx");
        assert_eq!(harvest.images[0].image_id.as_deref(), Some("abc123"));
        assert_eq!(harvest.stats.rows_parsed, 2);
        assert!(harvest.diagnostic.is_none());
    }

    #[tokio::test]
    async fn test_pipeline_applies_ignore_set() {
        let pipeline = LocalInventoryPipeline::new(MockCommand::ok(TABLE), ColumnarTextParser::default());
        let ignore: IgnoreSet = ["abc123"].into_iter().collect();

        let harvest = pipeline.execute(&ignore).await.unwrap();

        assert_eq!(harvest.images.len(), 1);
        assert_eq!(harvest.images[0].repository, "redis");
        assert_eq!(harvest.stats.rows_ignored, 1);
    }

    #[tokio::test]
    async fn test_pipeline_timeout() {
        let mut command = MockCommand::ok(TABLE);
        command.delay = Duration::from_secs(5);
        let pipeline = LocalInventoryPipeline::new(command, ColumnarTextParser::default())
            .with_timeout(Duration::from_millis(50));

        let err = pipeline.execute(&IgnoreSet::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::StageTimeout { ref stage, .. } if stage == "mock images"));
    }

    #[tokio::test]
    async fn test_pipeline_command_failure() {
        let pipeline = LocalInventoryPipeline::new(
            MockCommand::failing(|| ProcessError::Failed {
                program: "crictl".into(),
                code: Some(1),
                stderr: "connect: permission denied".into(),
            }),
            ColumnarTextParser::default(),
        );

        let err = pipeline.execute(&IgnoreSet::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::CommandFailed(ProcessError::Failed { .. })));
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_pipeline_bad_header_is_not_an_error() {
        let pipeline = LocalInventoryPipeline::new(
            MockCommand::ok("NAME  VERSION\nnginx latest\n"),
            ColumnarTextParser::default(),
        );

        let harvest = pipeline.execute(&IgnoreSet::new()).await.unwrap();

        assert!(harvest.images.is_empty());
        assert!(harvest.diagnostic.is_some());
    }

    #[tokio::test]
    async fn test_collect_uses_configured_ignore_set() {
        let ignore: IgnoreSet = ["def456"].into_iter().collect();
        let pipeline = LocalInventoryPipeline::new(MockCommand::ok(TABLE), ColumnarTextParser::default())
            .with_ignore_set(Arc::new(ignore));

        let inventory = pipeline.collect().await.unwrap();

        assert_eq!(pipeline.source_id(), "containerd");
        assert_eq!(inventory.images.len(), 1);
        assert_eq!(inventory.images[0].repository, "nginx");
    }

    #[tokio::test]
    async fn test_external_command_missing_executable() {
        let command = ExternalCommand::new("image-harvester-no-such-binary", ["images"]);

        let err = command.run().await.unwrap_err();

        assert!(matches!(err, ProcessError::NotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_external_command_output_and_exit_status() {
        let command = ExternalCommand::new("sh", ["-c", "printf 'IMAGE ID\\n'"]);
        assert_eq!(command.run().await.unwrap(), "IMAGE ID\n");
        assert_eq!(command.describe(), "sh -c printf 'IMAGE ID\\n'");

        let command = ExternalCommand::new("sh", ["-c", "echo denied >&2; exit 3"]);
        match command.run().await.unwrap_err() {
            ProcessError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "denied");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_external_command_is_killed_on_timeout() {
        let pipeline = LocalInventoryPipeline::new(
            ExternalCommand::new("sleep", ["5"]),
            ColumnarTextParser::default(),
        )
        .with_timeout(Duration::from_millis(100));

        let start = Instant::now();
        let err = pipeline.execute(&IgnoreSet::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::StageTimeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_command_does_not_finish() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!("sleep 0.3; touch '{}'", marker.display());
        let pipeline = LocalInventoryPipeline::new(
            ExternalCommand::new("sh", ["-c", script.as_str()]),
            ColumnarTextParser::default(),
        )
        .with_timeout(Duration::from_millis(50));

        let err = pipeline.execute(&IgnoreSet::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::StageTimeout { .. }));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!marker.exists());
    }

    #[test]
    fn test_from_argv() {
        assert!(ExternalCommand::from_argv(&[]).is_none());
        let command = ExternalCommand::from_argv(&["crictl".to_string(), "images".to_string()]).unwrap();
        assert_eq!(command.describe(), "crictl images");
        assert_eq!(ExternalCommand::crictl_images().describe(), "sudo crictl images");
    }
}
