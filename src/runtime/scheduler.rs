/// Topological step ordering
///
/// Depth-first from trigger steps (or root steps when the workflow has no
/// trigger), emitting each step after all of its dependencies. Steps that
/// are not reachable from the starting set are appended afterwards in the
/// same manner. Ties always follow step-list order, so the same definition
/// yields the same order on every run.

use crate::workflow::{Edge, Step, WorkflowGraph};
use std::collections::HashSet;

/// Order `steps` so every step follows its dependencies
///
/// Every input step appears exactly once. A step is marked visited before its
/// dependencies are walked, so a cyclic input still terminates (the order is
/// then only best-effort; cycles are rejected by graph validation first).
pub fn order<'a>(steps: &'a [Step], edges: &'a [Edge]) -> Vec<&'a Step> {
    let graph = WorkflowGraph::new(steps, edges);
    let mut visited: HashSet<&str> = HashSet::with_capacity(steps.len());
    let mut ordered = Vec::with_capacity(steps.len());

    let triggers = graph.trigger_steps();
    let starts = if triggers.is_empty() {
        graph.root_steps()
    } else {
        triggers
    };

    tracing::debug!(
        "📋 Scheduling {} steps from {:?}",
        steps.len(),
        starts.iter().map(|s| s.id.as_str()).collect::<Vec<_>>()
    );

    for step in starts {
        visit(&graph, step, &mut visited, &mut ordered);
        // Reachable steps precede disconnected ones
        visit_downstream(&graph, step, &mut visited, &mut ordered);
    }

    for step in steps {
        visit(&graph, step, &mut visited, &mut ordered);
    }

    ordered
}

/// Post-order visit: dependencies first, then the step itself
fn visit<'a>(
    graph: &WorkflowGraph<'a>,
    step: &'a Step,
    visited: &mut HashSet<&'a str>,
    ordered: &mut Vec<&'a Step>,
) {
    if !visited.insert(step.id.as_str()) {
        return;
    }
    for dependency in graph.dependencies_of(&step.id) {
        visit(graph, dependency, visited, ordered);
    }
    ordered.push(step);
}

/// Place everything reachable from `step`, siblings in step-list order
fn visit_downstream<'a>(
    graph: &WorkflowGraph<'a>,
    step: &'a Step,
    visited: &mut HashSet<&'a str>,
    ordered: &mut Vec<&'a Step>,
) {
    let mut frontier = vec![step];
    let mut expanded: HashSet<&str> = HashSet::new();

    while let Some(current) = frontier.pop() {
        if !expanded.insert(current.id.as_str()) {
            continue;
        }
        let targets: HashSet<&str> = graph
            .outgoing(&current.id)
            .map(|edge| edge.target.as_str())
            .collect();
        let successors: Vec<&'a Step> = graph
            .steps()
            .iter()
            .filter(|s| targets.contains(s.id.as_str()))
            .collect();

        for &successor in &successors {
            visit(graph, successor, visited, ordered);
        }
        frontier.extend(successors.into_iter().rev());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepKind;

    fn ids(order: &[&Step]) -> Vec<String> {
        order.iter().map(|s| s.id.clone()).collect()
    }

    fn position(order: &[&Step], id: &str) -> usize {
        order.iter().position(|s| s.id == id).unwrap()
    }

    #[test]
    fn linear_chain_follows_edges() {
        let steps = vec![
            Step::new("d", StepKind::Delay),
            Step::new("c", StepKind::Condition),
            Step::new("a", StepKind::ApiCall),
            Step::new("t", StepKind::WebhookTrigger),
        ];
        let edges = vec![Edge::new("t", "a"), Edge::new("a", "c"), Edge::new("c", "d")];
        assert_eq!(ids(&order(&steps, &edges)), vec!["t", "a", "c", "d"]);
    }

    #[test]
    fn dependencies_always_come_first() {
        let steps = vec![
            Step::new("join", StepKind::Transform),
            Step::new("left", StepKind::ApiCall),
            Step::new("right", StepKind::ApiCall),
            Step::new("t", StepKind::WebhookTrigger),
            Step::new("tail", StepKind::Delay),
        ];
        let edges = vec![
            Edge::new("t", "left"),
            Edge::new("t", "right"),
            Edge::new("left", "join"),
            Edge::new("right", "join"),
            Edge::new("join", "tail"),
        ];
        let ordered = order(&steps, &edges);
        assert_eq!(ordered.len(), steps.len());
        for edge in &edges {
            assert!(position(&ordered, &edge.source) < position(&ordered, &edge.target));
        }
    }

    #[test]
    fn ties_follow_step_list_order() {
        let steps = vec![
            Step::new("t", StepKind::WebhookTrigger),
            Step::new("b", StepKind::Transform),
            Step::new("a", StepKind::Transform),
        ];
        let edges = vec![Edge::new("t", "a"), Edge::new("t", "b")];
        assert_eq!(ids(&order(&steps, &edges)), vec!["t", "b", "a"]);
        assert_eq!(ids(&order(&steps, &edges)), ids(&order(&steps, &edges)));
    }

    #[test]
    fn roots_are_used_without_triggers() {
        let steps = vec![
            Step::new("second", StepKind::Transform),
            Step::new("first", StepKind::ApiCall),
        ];
        let edges = vec![Edge::new("first", "second")];
        assert_eq!(ids(&order(&steps, &edges)), vec!["first", "second"]);
    }

    #[test]
    fn disconnected_steps_are_appended_once() {
        let steps = vec![
            Step::new("island", StepKind::Delay),
            Step::new("t", StepKind::WebhookTrigger),
            Step::new("a", StepKind::ApiCall),
        ];
        let edges = vec![Edge::new("t", "a")];
        assert_eq!(ids(&order(&steps, &edges)), vec!["t", "a", "island"]);
    }

    #[test]
    fn cyclic_input_terminates() {
        let steps = vec![Step::new("a", StepKind::Transform), Step::new("b", StepKind::Transform)];
        let edges = vec![Edge::new("a", "b"), Edge::new("b", "a")];
        let ordered = order(&steps, &edges);
        assert_eq!(ordered.len(), 2);
    }
}
