use serde_json::Value;

use weft_core::context::{stringify, ExecutionContext};
use weft_core::graph::Graph;

/// Resolve a node's input from the outputs of its upstream nodes.
///
/// Only sources that have produced an output count. None gives an empty
/// string, one is passed through verbatim, and with several the last one in
/// edge order wins, stringified. Values are never merged.
pub fn resolve_input(graph: &Graph, context: &ExecutionContext, node_id: &str) -> Value {
    let mut found: Vec<&Value> = graph
        .incoming(node_id)
        .filter_map(|edge| context.get(&edge.source))
        .collect();

    match found.len() {
        0 => Value::String(String::new()),
        1 => found.remove(0).clone(),
        _ => Value::String(found.last().map(|v| stringify(v)).unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::graph::{Edge, Node, NodeKind};

    fn graph() -> Graph {
        Graph::new(
            vec![
                Node::new("a", NodeKind::Trigger),
                Node::new("b", NodeKind::Request),
                Node::new("c", NodeKind::Output),
            ],
            vec![Edge::new("a", "c"), Edge::new("b", "c")],
        )
    }

    #[test]
    fn no_upstream_output_is_empty_string() {
        let ctx = ExecutionContext::new();
        assert_eq!(resolve_input(&graph(), &ctx, "a"), json!(""));
        assert_eq!(resolve_input(&graph(), &ctx, "c"), json!(""));
    }

    #[test]
    fn single_upstream_is_verbatim() {
        let mut ctx = ExecutionContext::new();
        ctx.record("b", json!({"id": 1}));
        assert_eq!(resolve_input(&graph(), &ctx, "c"), json!({"id": 1}));
    }

    #[test]
    fn several_upstreams_take_last_stringified() {
        let mut ctx = ExecutionContext::new();
        ctx.record("a", json!("Start"));
        ctx.record("b", json!({"id": 1}));
        assert_eq!(resolve_input(&graph(), &ctx, "c"), json!(r#"{"id":1}"#));
    }

    #[test]
    fn last_string_stays_a_string() {
        let mut ctx = ExecutionContext::new();
        ctx.record("a", json!({"x": 1}));
        ctx.record("b", json!("plain"));
        assert_eq!(resolve_input(&graph(), &ctx, "c"), json!("plain"));
    }
}
