//! The middleware trait and its registry.

use super::HookPoint;
use crate::core::EvaluationResult;
use crate::errors::MiddlewareError;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Input handed to a middleware at a hook point.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// The run this hook fired in.
    pub run_id: Uuid,
    /// The hook point.
    pub hook: HookPoint,
    /// Stage name the hook belongs to.
    pub stage: String,
    /// Snapshot of the run context when the hook fired.
    pub context: BTreeMap<String, Value>,
    /// The stage's output as a JSON object; `Null` for pre hooks.
    pub output: Value,
}

impl HookContext {
    /// Creates a hook context with no output.
    #[must_use]
    pub fn new(run_id: Uuid, hook: HookPoint, stage: impl Into<String>) -> Self {
        Self {
            run_id,
            hook,
            stage: stage.into(),
            context: BTreeMap::new(),
            output: Value::Null,
        }
    }

    /// Sets the context snapshot.
    #[must_use]
    pub fn with_context(mut self, context: BTreeMap<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Sets the stage output.
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    /// Looks a non-empty text field up in the output, then in the context.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        non_empty(self.output.get(key)).or_else(|| non_empty(self.context.get(key)))
    }
}

fn non_empty(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// What a middleware reports for one hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareOutcome {
    /// Whether the artifact passed this middleware's gate.
    pub passed: bool,
    /// Evaluation produced by the middleware, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
    /// Free-form telemetry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl MiddlewareOutcome {
    /// A passing outcome with nothing attached.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            passed: true,
            evaluation: None,
            metadata: None,
        }
    }

    /// An outcome carrying an evaluation; `passed` follows the evaluation.
    #[must_use]
    pub fn evaluated(evaluation: EvaluationResult) -> Self {
        Self {
            passed: evaluation.passed,
            evaluation: Some(evaluation),
            metadata: None,
        }
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The record of one middleware invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookRecord {
    /// The hook point.
    pub hook: HookPoint,
    /// The middleware name.
    pub middleware: String,
    /// The outcome, when the middleware succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MiddlewareOutcome>,
    /// The error, when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HookRecord {
    /// The context key this record is merged under.
    #[must_use]
    pub fn context_key(&self) -> String {
        format!("{}.{}", self.hook, self.middleware)
    }

    /// True when the middleware ran and reported a failed gate.
    ///
    /// A middleware error is not a gate failure.
    #[must_use]
    pub fn gate_failed(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| !o.passed)
    }

    /// The evaluation reported by the middleware.
    #[must_use]
    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        self.outcome.as_ref().and_then(|o| o.evaluation.as_ref())
    }

    /// The record as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Code that runs at hook points.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in records and context keys.
    fn name(&self) -> &str;

    /// Hooks this middleware subscribes to.
    fn hooks(&self) -> Vec<HookPoint>;

    /// Whether the middleware is active.
    fn enabled(&self) -> bool {
        true
    }

    /// Whether the middleware runs at `hook`.
    fn should_execute(&self, hook: HookPoint) -> bool {
        self.enabled() && self.hooks().contains(&hook)
    }

    /// Handles one hook firing.
    async fn execute(&self, ctx: &HookContext) -> Result<MiddlewareOutcome, MiddlewareError>;
}

/// Ordered collection of middleware.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("middleware", &self.names())
            .finish()
    }
}

impl MiddlewareRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a middleware after the ones already registered.
    pub fn register(&mut self, middleware: Arc<dyn Middleware>) {
        debug!(middleware = middleware.name(), "Registered middleware");
        self.middleware.push(middleware);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.register(middleware);
        self
    }

    /// Registered middleware names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.middleware.iter().map(|m| m.name().to_string()).collect()
    }

    /// Returns true if any enabled middleware listens on `hook`.
    #[must_use]
    pub fn has_subscribers(&self, hook: HookPoint) -> bool {
        self.middleware.iter().any(|m| m.should_execute(hook))
    }

    /// Returns the number of registered middleware.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Runs every enabled subscriber of `ctx.hook` in registration order.
    ///
    /// Errors and panics are caught per middleware and recorded; the
    /// remaining subscribers still run.
    pub async fn dispatch(&self, ctx: &HookContext) -> Vec<HookRecord> {
        let mut records = Vec::new();
        for middleware in self.middleware.iter().filter(|m| m.should_execute(ctx.hook)) {
            let name = middleware.name().to_string();
            let result = AssertUnwindSafe(middleware.execute(ctx)).catch_unwind().await;

            let record = match result {
                Ok(Ok(outcome)) => {
                    debug!(hook = %ctx.hook, middleware = %name, passed = outcome.passed, "Middleware completed");
                    HookRecord {
                        hook: ctx.hook,
                        middleware: name,
                        outcome: Some(outcome),
                        error: None,
                    }
                }
                Ok(Err(err)) => {
                    warn!(hook = %ctx.hook, middleware = %name, error = %err, "Middleware failed");
                    HookRecord {
                        hook: ctx.hook,
                        middleware: name,
                        outcome: None,
                        error: Some(err.to_string()),
                    }
                }
                Err(_) => {
                    error!(hook = %ctx.hook, middleware = %name, "Middleware panicked");
                    HookRecord {
                        hook: ctx.hook,
                        middleware: name.clone(),
                        outcome: None,
                        error: Some(format!("middleware '{name}' panicked at {}", ctx.hook)),
                    }
                }
            };
            records.push(record);
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Recorder {
        name: &'static str,
        hooks: Vec<HookPoint>,
        seen: Arc<Mutex<Vec<String>>>,
        passed: bool,
    }

    #[async_trait]
    impl Middleware for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn hooks(&self) -> Vec<HookPoint> {
            self.hooks.clone()
        }

        async fn execute(&self, ctx: &HookContext) -> Result<MiddlewareOutcome, MiddlewareError> {
            self.seen.lock().push(format!("{}@{}", self.name, ctx.hook));
            Ok(MiddlewareOutcome {
                passed: self.passed,
                evaluation: None,
                metadata: None,
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl Middleware for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn hooks(&self) -> Vec<HookPoint> {
            HookPoint::ALL.to_vec()
        }

        async fn execute(&self, ctx: &HookContext) -> Result<MiddlewareOutcome, MiddlewareError> {
            Err(MiddlewareError::new("broken", ctx.hook.as_str(), "sink unavailable"))
        }
    }

    struct Panicky;

    #[async_trait]
    impl Middleware for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }

        fn hooks(&self) -> Vec<HookPoint> {
            vec![HookPoint::PostCoder]
        }

        async fn execute(&self, _ctx: &HookContext) -> Result<MiddlewareOutcome, MiddlewareError> {
            panic!("middleware bug");
        }
    }

    fn ctx(hook: HookPoint) -> HookContext {
        HookContext::new(Uuid::new_v4(), hook, "implementation")
    }

    #[tokio::test]
    async fn test_dispatch_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = MiddlewareRegistry::new()
            .with(Arc::new(Recorder {
                name: "first",
                hooks: vec![HookPoint::PostCoder],
                seen: seen.clone(),
                passed: true,
            }))
            .with(Arc::new(Recorder {
                name: "second",
                hooks: vec![HookPoint::PostCoder, HookPoint::PreCoder],
                seen: seen.clone(),
                passed: false,
            }));

        let records = registry.dispatch(&ctx(HookPoint::PostCoder)).await;
        assert_eq!(*seen.lock(), vec!["first@post_coder", "second@post_coder"]);
        assert_eq!(records.len(), 2);
        assert!(!records[0].gate_failed());
        assert!(records[1].gate_failed());
        assert_eq!(records[1].context_key(), "post_coder.second");

        let records = registry.dispatch(&ctx(HookPoint::PreCoder)).await;
        assert_eq!(records.len(), 1);
        assert!(!registry.has_subscribers(HookPoint::PostRefiner));
    }

    #[tokio::test]
    async fn test_errors_are_recorded_not_dropped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = MiddlewareRegistry::new()
            .with(Arc::new(Broken))
            .with(Arc::new(Panicky))
            .with(Arc::new(Recorder {
                name: "after",
                hooks: vec![HookPoint::PostCoder],
                seen: seen.clone(),
                passed: true,
            }));

        let records = registry.dispatch(&ctx(HookPoint::PostCoder)).await;
        assert_eq!(records.len(), 3);
        assert!(records[0].error.as_deref().unwrap().contains("sink unavailable"));
        assert!(records[1].error.as_deref().unwrap().contains("panicked"));
        assert!(!records[0].gate_failed());
        assert!(records[2].outcome.is_some());
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_hook_context_text_lookup() {
        let mut context = BTreeMap::new();
        context.insert("final_implementation".to_string(), json!("fn main() {}"));
        let hc = ctx(HookPoint::PostRefiner)
            .with_context(context)
            .with_output(json!({"code": ""}));

        assert_eq!(hc.text("code"), None);
        assert_eq!(hc.text("final_implementation"), Some("fn main() {}"));
    }

    #[test]
    fn test_record_serialization() {
        let record = HookRecord {
            hook: HookPoint::PostRefiner,
            middleware: "evaluation".to_string(),
            outcome: Some(MiddlewareOutcome::pass()),
            error: None,
        };
        let value = record.to_value();
        assert_eq!(value["hook"], "post_refiner");
        assert_eq!(value["outcome"]["passed"], true);
        assert!(value.get("error").is_none());
    }
}
