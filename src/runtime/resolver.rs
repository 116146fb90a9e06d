/// Variable resolver for `{{path.to.value}}` templates
///
/// Rewrites step config against a read-only view of the run: `trigger.*` is
/// the trigger payload, `vars.*` the run's variable bag, and any other root
/// is the output of a completed step with that id. Resolution is best-effort:
/// a reference that cannot be resolved stays in the output verbatim.
///
/// Substitution rule: a string that is exactly one `{{...}}` token resolves
/// to the raw value (type preserved). A token embedded in a longer string is
/// replaced by its text form: strings as-is, anything else as compact JSON.

use crate::runtime::context::ExecutionContext;
use serde_json::{Map, Value};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Read-only view of everything templates may reference
#[derive(Debug, Clone, Copy)]
pub struct ContextView<'a> {
    ctx: &'a ExecutionContext,
}

impl<'a> ContextView<'a> {
    pub fn new(ctx: &'a ExecutionContext) -> Self {
        Self { ctx }
    }

    fn root(&self, name: &str) -> Option<&'a Value> {
        match name {
            "trigger" => Some(&self.ctx.trigger_payload),
            "vars" => None,
            step_id => self.ctx.completed_output(step_id),
        }
    }

    fn variables(&self) -> &'a Map<String, Value> {
        &self.ctx.variables
    }

    /// Evaluate a dot path such as `fetch.data.items.0.id`
    pub fn lookup(&self, path: &[&str]) -> Option<&'a Value> {
        let (first, rest) = path.split_first()?;
        let (mut current, rest) = if *first == "vars" {
            let (name, rest) = rest.split_first()?;
            (self.variables().get(*name)?, rest)
        } else {
            (self.root(first)?, rest)
        };

        for segment in rest {
            current = match current {
                Value::Object(map) => map.get(*segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Resolve every template inside `value` against the run context
pub fn resolve(value: &Value, ctx: &ExecutionContext) -> Value {
    resolve_with(value, &ContextView::new(ctx))
}

/// Resolve against an explicit view
pub fn resolve_with(value: &Value, view: &ContextView<'_>) -> Value {
    match value {
        Value::String(text) => resolve_string(text, view),
        Value::Array(items) => Value::Array(items.iter().map(|item| resolve_with(item, view)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), resolve_with(item, view)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// One piece of a parsed template string
#[derive(Debug, PartialEq)]
enum Segment<'t> {
    Literal(&'t str),
    /// `raw` is the full `{{ ... }}` text, `expression` what sits between the braces
    Reference { raw: &'t str, expression: &'t str },
}

/// Split a string into literal text and `{{...}}` references
fn parse_template(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        let raw_len = OPEN.len() + end + CLOSE.len();
        segments.push(Segment::Reference {
            raw: &rest[start..start + raw_len],
            expression: &after_open[..end],
        });
        rest = &rest[start + raw_len..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

/// Split `a.b.c` into its segments; empty segments make the path invalid
fn parse_path(expression: &str) -> Option<Vec<&str>> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return None;
    }
    let segments: Vec<&str> = trimmed.split('.').map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments)
}

fn lookup_expression<'a>(expression: &str, view: &ContextView<'a>) -> Option<&'a Value> {
    parse_path(expression).and_then(|path| view.lookup(&path))
}

fn resolve_string(text: &str, view: &ContextView<'_>) -> Value {
    if !text.contains(OPEN) {
        return Value::String(text.to_string());
    }

    let segments = parse_template(text);

    if let [Segment::Reference { expression, .. }] = segments.as_slice() {
        return match lookup_expression(expression, view) {
            Some(value) => value.clone(),
            None => Value::String(text.to_string()),
        };
    }

    let mut out = String::with_capacity(text.len());
    for segment in &segments {
        match segment {
            Segment::Literal(literal) => out.push_str(literal),
            Segment::Reference { raw, expression } => match lookup_expression(expression, view) {
                Some(Value::String(s)) => out.push_str(s),
                Some(other) => out.push_str(&other.to_string()),
                None => out.push_str(raw),
            },
        }
    }
    Value::String(out)
}
