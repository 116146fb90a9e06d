/// Step execution handlers, one per step kind
///
/// Each handler reads its typed config, resolves templates against the run
/// context and produces a JSON output or an `ExecutionError`. Handlers never
/// write to the context; the engine records what they return.

use crate::{
    runtime::{
        context::ExecutionContext,
        error::ExecutionError,
        expression::{self, ExpressionScope},
        gateway::{is_absolute, GatewayRequest, OutboundGateway},
        resolver,
    },
    workflow::types::{ApiCallConfig, DelayConfig, ExpressionConfig, Step, StepKind},
};
use serde_json::{json, Map, Value};
use std::{sync::Arc, time::Duration};

/// Step executor that dispatches on step kind
///
/// Holds the outbound gateway used by api_call steps, the delay applied
/// when a delay step does not configure one and the deadline for transform
/// and condition expressions.
pub struct StepExecutor {
    gateway: Arc<dyn OutboundGateway>,
    default_delay: Duration,
    expression_timeout: Duration,
}

/// Deadline for one expression unless configured otherwise
pub const DEFAULT_EXPRESSION_TIMEOUT: Duration = Duration::from_secs(5);

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor")
            .field("default_delay", &self.default_delay)
            .field("expression_timeout", &self.expression_timeout)
            .finish_non_exhaustive()
    }
}

impl StepExecutor {
    pub fn new(gateway: Arc<dyn OutboundGateway>, default_delay: Duration) -> Self {
        Self {
            gateway,
            default_delay,
            expression_timeout: DEFAULT_EXPRESSION_TIMEOUT,
        }
    }

    pub fn with_expression_timeout(mut self, timeout: Duration) -> Self {
        self.expression_timeout = timeout;
        self
    }

    /// Execute a single step against the current context
    pub async fn execute_step(&self, step: &Step, ctx: &ExecutionContext) -> Result<Value, ExecutionError> {
        tracing::debug!("🚀 Executing step '{}' (type: {})", step.id, step.kind);

        match step.kind {
            StepKind::WebhookTrigger | StepKind::ScheduleTrigger => Ok(ctx.trigger_payload.clone()),
            StepKind::ApiCall => self.execute_api_call(step, ctx).await,
            StepKind::Transform => self.execute_transform(step, ctx).await,
            StepKind::Condition => self.execute_condition(step, ctx).await,
            StepKind::Delay => self.execute_delay(step).await,
            StepKind::ErrorHandler => Ok(execute_error_handler(ctx)),
        }
    }

    /// Issue one request through the gateway
    ///
    /// Expected config: { "apiId": "crm", "endpoint": "/users/{{trigger.userId}}", "method": "GET",
    ///                    "headers": {...}, "body": {...} }
    /// Any HTTP status is a successful step; only transport and decode
    /// failures fail it.
    async fn execute_api_call(&self, step: &Step, ctx: &ExecutionContext) -> Result<Value, ExecutionError> {
        let config: ApiCallConfig = step
            .parse_config()
            .map_err(|e| ExecutionError::invalid_config(&step.id, e))?;

        let method = config.method.to_uppercase();
        if reqwest::Method::from_bytes(method.as_bytes()).is_err() {
            return Err(ExecutionError::invalid_config(
                &step.id,
                format!("unsupported HTTP method '{}'", config.method),
            ));
        }

        let endpoint = match resolver::resolve(&Value::String(config.endpoint), ctx) {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let headers = match resolver::resolve(&Value::Object(config.headers), ctx) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let body = config.body.as_ref().map(|body| resolver::resolve(body, ctx));

        let request = GatewayRequest {
            url: build_url(config.api_id.as_deref(), &endpoint),
            method,
            headers,
            body,
        };

        tracing::debug!("🌐 Step '{}' calling {} {}", step.id, request.method, request.url);

        let response = self.gateway.request(request).await?;

        tracing::info!("📡 Step '{}' received status {}", step.id, response.status);

        Ok(response.into_output())
    }

    /// Suspend this run without blocking other runs
    ///
    /// Expected config: { "delayMs": 1500 }
    async fn execute_delay(&self, step: &Step) -> Result<Value, ExecutionError> {
        let config: DelayConfig = step
            .parse_config()
            .map_err(|e| ExecutionError::invalid_config(&step.id, e))?;
        let delay = config
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_delay);

        tracing::debug!("⏳ Step '{}' sleeping for {:?}", step.id, delay);
        tokio::time::sleep(delay).await;

        Ok(json!({ "delayed": delay.as_millis() as u64 }))
    }

    /// Evaluate the configured expression with `input`, `trigger` and `vars` bound
    ///
    /// Runs on the blocking pool so a slow expression never stalls other runs.
    async fn evaluate_expression(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        input: &Value,
    ) -> Result<Option<Value>, ExecutionError> {
        let config: ExpressionConfig = step
            .parse_config()
            .map_err(|e| ExecutionError::invalid_config(&step.id, e))?;

        let Some(source) = config.expression.filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let input = input.clone();
        let trigger = ctx.trigger_payload.clone();
        let vars = Value::Object(ctx.variables.clone());
        let timeout = self.expression_timeout;

        tokio::task::spawn_blocking(move || {
            let scope = ExpressionScope::new()
                .bind("input", &input)
                .bind("trigger", &trigger)
                .bind("vars", &vars);
            expression::evaluate(&source, &scope, timeout)
        })
        .await
        .map_err(|e| ExecutionError::Expression(format!("expression task failed: {}", e)))?
        .map(Some)
        .map_err(ExecutionError::Expression)
    }

    /// Derive a value from all completed outputs
    ///
    /// Expected config: { "expression": "input.fetch.data.total * 2" }
    /// Without an expression the input mapping passes straight through.
    async fn execute_transform(&self, step: &Step, ctx: &ExecutionContext) -> Result<Value, ExecutionError> {
        let input = Value::Object(ctx.completed_outputs());
        match self.evaluate_expression(step, ctx, &input).await? {
            Some(value) => Ok(value),
            None => Ok(input),
        }
    }

    /// Evaluate a boolean over all completed outputs
    ///
    /// Expected config: { "expression": "input.fetch.status == 200" }
    /// Without an expression the condition is met.
    async fn execute_condition(&self, step: &Step, ctx: &ExecutionContext) -> Result<Value, ExecutionError> {
        let input = Value::Object(ctx.completed_outputs());
        let condition_met = match self.evaluate_expression(step, ctx, &input).await? {
            Some(value) => expression::is_truthy(&value),
            None => true,
        };

        tracing::debug!("🔀 Condition '{}' evaluated to {}", step.id, condition_met);

        Ok(json!({ "conditionMet": condition_met, "input": input }))
    }
}

/// Gateway-relative path `<apiId>/<endpoint>`, or the endpoint itself when absolute
fn build_url(api_id: Option<&str>, endpoint: &str) -> String {
    if is_absolute(endpoint) {
        return endpoint.to_string();
    }
    let path = endpoint.trim_start_matches('/');
    match api_id.map(|id| id.trim_matches('/')).filter(|id| !id.is_empty()) {
        Some(id) => format!("{}/{}", id, path),
        None => path.to_string(),
    }
}

/// List the failures recorded so far for cleanup steps downstream
fn execute_error_handler(ctx: &ExecutionContext) -> Value {
    let errors: Vec<Value> = ctx
        .results()
        .iter()
        .filter_map(|r| {
            r.error
                .as_ref()
                .map(|error| json!({ "stepId": r.step_id, "error": error }))
        })
        .collect();
    json!({ "errors": errors })
}
