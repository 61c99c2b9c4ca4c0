//! Middleware that mirrors hook firings onto an event sink.

use super::{HookContext, HookPoint, Middleware, MiddlewareOutcome};
use crate::errors::MiddlewareError;
use crate::events::{event_types, EventSink, RunEvent};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Emits a `hook.fired` event for every hook it subscribes to.
///
/// Always passes.
pub struct EventMiddleware {
    sink: Arc<dyn EventSink>,
    hooks: Vec<HookPoint>,
}

impl EventMiddleware {
    /// Subscribes to every hook point.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            hooks: HookPoint::ALL.to_vec(),
        }
    }

    /// Restricts the subscription.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Vec<HookPoint>) -> Self {
        self.hooks = hooks;
        self
    }
}

impl std::fmt::Debug for EventMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMiddleware").field("hooks", &self.hooks).finish()
    }
}

#[async_trait]
impl Middleware for EventMiddleware {
    fn name(&self) -> &str {
        "events"
    }

    fn hooks(&self) -> Vec<HookPoint> {
        self.hooks.clone()
    }

    async fn execute(&self, ctx: &HookContext) -> Result<MiddlewareOutcome, MiddlewareError> {
        let has_output = !ctx.output.is_null();
        self.sink
            .emit(RunEvent::new(event_types::HOOK_FIRED, ctx.run_id).with_data(json!({
                "hook": ctx.hook,
                "stage": ctx.stage,
                "has_output": has_output,
                "context_keys": ctx.context.keys().collect::<Vec<_>>(),
            })))
            .await;
        Ok(MiddlewareOutcome::pass())
    }
}
