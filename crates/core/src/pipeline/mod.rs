//! Operation pipeline
//!
//! Every public engine operation runs through an ordered list of layers.
//! Each layer sees the operation before it runs and its result afterwards;
//! a layer may reject the operation in `before`. Layers run `before` in
//! order and `after` in reverse.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hearthsync_domain::{HearthSyncError, Result};
use tracing::{info, warn};

/// What a layer knows about the running operation.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    /// Stable operation identifier, e.g. `"oauth::complete_session"`.
    pub name: &'static str,
    /// Non-sensitive structured fields for logging.
    pub fields: Vec<(&'static str, String)>,
    /// Input problems found while building the context.
    pub violations: Vec<String>,
}

impl OperationContext {
    pub fn new(name: &'static str) -> Self {
        Self { name, ..Self::default() }
    }

    #[must_use]
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    /// Record a violation unless `ok` holds.
    #[must_use]
    pub fn require(mut self, ok: bool, message: impl Into<String>) -> Self {
        if !ok {
            self.violations.push(message.into());
        }
        self
    }

    fn rendered_fields(&self) -> String {
        self.fields.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" ")
    }
}

/// Outcome handed to [`OperationLayer::after`].
#[derive(Debug, Clone, Copy)]
pub struct OperationReport<'a> {
    pub elapsed: Duration,
    pub error: Option<&'a HearthSyncError>,
}

impl OperationReport<'_> {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

pub trait OperationLayer: Send + Sync {
    /// Called before the operation. Returning `Err` skips the operation and
    /// every later layer.
    fn before(&self, _ctx: &OperationContext) -> Result<()> {
        Ok(())
    }

    fn after(&self, _ctx: &OperationContext, _report: OperationReport<'_>) {}
}

/// Rejects operations whose context carries violations.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidationLayer;

impl OperationLayer for ValidationLayer {
    fn before(&self, ctx: &OperationContext) -> Result<()> {
        if ctx.violations.is_empty() {
            return Ok(());
        }
        Err(HearthSyncError::Validation(ctx.violations.join("; ")))
    }
}

/// Structured execution log for every operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingLayer;

impl OperationLayer for LoggingLayer {
    fn after(&self, ctx: &OperationContext, report: OperationReport<'_>) {
        let duration_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX);
        let fields = ctx.rendered_fields();
        match report.error {
            None => info!(operation = ctx.name, duration_ms, fields, "operation_success"),
            Some(err) => warn!(
                operation = ctx.name,
                duration_ms,
                fields,
                error_type = err.label(),
                error = %err,
                "operation_failure"
            ),
        }
    }
}

/// Warns about operations slower than a threshold.
#[derive(Debug, Clone, Copy)]
pub struct TimingLayer {
    slow_threshold: Duration,
}

impl TimingLayer {
    pub fn new(slow_threshold: Duration) -> Self {
        Self { slow_threshold }
    }
}

impl Default for TimingLayer {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl OperationLayer for TimingLayer {
    fn after(&self, ctx: &OperationContext, report: OperationReport<'_>) {
        if report.elapsed > self.slow_threshold {
            warn!(
                operation = ctx.name,
                duration_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
                threshold_ms = u64::try_from(self.slow_threshold.as_millis()).unwrap_or(u64::MAX),
                "slow operation"
            );
        }
    }
}

/// Ordered list of layers wrapped around an operation.
#[derive(Clone, Default)]
pub struct OperationPipeline {
    layers: Vec<Arc<dyn OperationLayer>>,
}

impl OperationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validation, then timing, then logging.
    pub fn standard() -> Self {
        Self::new().with_layer(ValidationLayer).with_layer(TimingLayer::default()).with_layer(LoggingLayer)
    }

    #[must_use]
    pub fn with_layer(mut self, layer: impl OperationLayer + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub async fn run<T, F, Fut>(&self, ctx: OperationContext, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        for (entered, layer) in self.layers.iter().enumerate() {
            if let Err(err) = layer.before(&ctx) {
                let report = OperationReport { elapsed: start.elapsed(), error: Some(&err) };
                for outer in self.layers[..entered].iter().rev() {
                    outer.after(&ctx, report);
                }
                return Err(err);
            }
        }

        let result = operation().await;

        let report = OperationReport { elapsed: start.elapsed(), error: result.as_ref().err() };
        for layer in self.layers.iter().rev() {
            layer.after(&ctx, report);
        }
        result
    }
}

impl fmt::Debug for OperationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationPipeline").field("layers", &self.layers.len()).finish()
    }
}
