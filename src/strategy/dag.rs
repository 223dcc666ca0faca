// =============================================================================
// Composite DAG Runner (C11)
// =============================================================================
//
// `run_composite_strategy` normalizes/validates a `CompositeGraph`,
// topologically sorts it (Kahn's algorithm, §9), executes nodes in that
// order gating each on its incoming edges, dispatches local nodes to C12's
// registry and AI nodes through C10's quality gate (at most one AI call per
// run), then derives the final signal/confidence/explanation per the
// configured output policy. Grounded on the teacher's `decision_envelope.rs`
// layered-verdict idea generalized into a graph.
// =============================================================================

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::signal::types::{FeatureSnapshot, Signal};
use crate::strategy::local::{LocalStrategyRegistry, StrategyContext, StrategyOutcome};

pub const MAX_NODES: usize = 30;
pub const MAX_EDGES: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Local,
    Ai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeNode {
    pub id: String,
    pub kind: NodeKind,
    pub ref_id: String,
    #[serde(default)]
    pub config_overrides: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRule {
    Always,
    IfSignalNotNeutral,
    IfConfidenceGte,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeEdge {
    pub from: String,
    pub to: String,
    pub rule: EdgeRule,
    #[serde(default)]
    pub confidence_gte: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    Pipeline,
    Vote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPolicy {
    FirstNonNeutral,
    OverrideByConfidence,
    LocalSignalAiExplain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeGraph {
    pub nodes: Vec<CompositeNode>,
    pub edges: Vec<CompositeEdge>,
    #[serde(default = "default_combine_mode")]
    pub combine_mode: CombineMode,
    #[serde(default = "default_output_policy")]
    pub output_policy: OutputPolicy,
}

fn default_combine_mode() -> CombineMode {
    CombineMode::Pipeline
}
fn default_output_policy() -> OutputPolicy {
    OutputPolicy::LocalSignalAiExplain
}

/// §4.11 step 2: validate structure before anything executes. `resolver`
/// resolves `CompositeNode.ref_id` the way `resolveRef` does in the source —
/// local nodes must name a registered strategy; an unresolved ref invalidates
/// the whole graph rather than merely skipping that node at run time (§7:
/// "graph validation... composite run short-circuits with a zero-effect
/// result"). AI node `ref_id`s are opaque explainer identifiers the caller
/// (not this registry) interprets, so only `NodeKind::Local` refs are checked
/// here.
pub fn validate_graph(graph: &CompositeGraph, resolver: &dyn NodeRefResolver) -> Result<Vec<String>, Vec<GraphError>> {
    let mut errors = Vec::new();

    if graph.nodes.is_empty() {
        errors.push(GraphError::Empty);
    }
    if graph.nodes.len() > MAX_NODES {
        errors.push(GraphError::TooManyNodes(graph.nodes.len()));
    }
    if graph.edges.len() > MAX_EDGES {
        errors.push(GraphError::TooManyEdges(graph.edges.len()));
    }

    let mut seen_ids = HashSet::new();
    for node in &graph.nodes {
        if !seen_ids.insert(node.id.clone()) {
            errors.push(GraphError::DuplicateId(node.id.clone()));
        }
        if node.kind == NodeKind::Local && !resolver.resolve_local(&node.ref_id) {
            errors.push(GraphError::UnresolvedNodeRef(node.id.clone(), node.ref_id.clone()));
        }
    }

    let node_ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &graph.edges {
        if edge.from == edge.to {
            errors.push(GraphError::SelfLoop(edge.from.clone()));
        }
        if !node_ids.contains(edge.from.as_str()) {
            errors.push(GraphError::UnknownRef(edge.from.clone()));
        }
        if !node_ids.contains(edge.to.as_str()) {
            errors.push(GraphError::UnknownRef(edge.to.clone()));
        }
        if edge.rule == EdgeRule::IfConfidenceGte && edge.confidence_gte.is_none() {
            errors.push(GraphError::MissingConfidenceThreshold(edge.to.clone()));
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    match topo_sort(graph) {
        Some(order) => Ok(order),
        None => Err(vec![GraphError::Cyclic]),
    }
}

/// Kahn's algorithm; `hasCycle = topoOrder.len() < nodes.len()` (§9).
fn topo_sort(graph: &CompositeGraph) -> Option<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = graph.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        *in_degree.get_mut(edge.to.as_str()).unwrap() += 1;
        adjacency.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
    }

    // Deterministic order: sort the initial zero-in-degree frontier by id.
    let mut initial: Vec<&str> = in_degree.iter().filter(|(_, &deg)| deg == 0).map(|(&id, _)| id).collect();
    initial.sort_unstable();
    let mut queue: VecDeque<&str> = initial.into();

    let mut order = Vec::new();
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        if let Some(neighbors) = adjacency.get(id) {
            let mut ready = Vec::new();
            for &n in neighbors {
                let deg = in_degree.get_mut(n).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.push(n);
                }
            }
            ready.sort_unstable();
            for n in ready {
                queue.push_back(n);
            }
        }
    }

    if order.len() < graph.nodes.len() {
        None
    } else {
        Some(order)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeResult {
    pub node_id: String,
    pub executed: bool,
    pub skipped_reason: Option<String>,
    pub signal: Option<Signal>,
    pub confidence: Option<f64>,
    pub outcome: Option<StrategyOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositeRunResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub signal: Signal,
    pub confidence: f64,
    pub explanation: String,
    pub tags: Vec<String>,
    pub key_drivers: Vec<String>,
    pub node_results: Vec<NodeResult>,
    pub ai_calls_used: u32,
}

impl CompositeRunResult {
    fn invalid(errors: Vec<GraphError>) -> Self {
        CompositeRunResult {
            valid: false,
            errors: errors.iter().map(|e| e.to_string()).collect(),
            warnings: vec![],
            signal: Signal::Neutral,
            confidence: 0.0,
            explanation: String::new(),
            tags: vec![],
            key_drivers: vec![],
            node_results: vec![],
            ai_calls_used: 0,
        }
    }
}

/// Resolves a composite node's `refId` against a local registry (AI node
/// `refId`s are opaque explainer identifiers the caller interprets).
pub trait NodeRefResolver {
    fn resolve_local(&self, ref_id: &str) -> bool;
}

impl NodeRefResolver for LocalStrategyRegistry {
    fn resolve_local(&self, ref_id: &str) -> bool {
        self.contains(ref_id)
    }
}

/// Callback invoked for AI nodes; the caller wires this to C10's quality
/// gate + C6's AI guard + the actual explainer call. Returns `None` when the
/// gate blocks the call (any reason), `Some` with the explainer's output
/// otherwise.
pub trait AiNodeInvoker {
    fn invoke(&mut self, ctx: &StrategyContext, node: &CompositeNode) -> Option<StrategyOutcome>;
}

/// §4.11. `base_signal`/`base_confidence` seed the pipeline context; a fresh
/// `StrategyContext` threads through each local/AI node in topological
/// order.
pub fn run_composite_strategy(
    graph: &CompositeGraph,
    base_signal: Signal,
    base_confidence: f64,
    feature_snapshot: FeatureSnapshot,
    registry: &LocalStrategyRegistry,
    ai_invoker: &mut dyn AiNodeInvoker,
) -> CompositeRunResult {
    let order = match validate_graph(graph, registry) {
        Ok(order) => order,
        Err(errors) => return CompositeRunResult::invalid(errors),
    };

    let nodes_by_id: HashMap<&str, &CompositeNode> =
        graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut incoming: HashMap<&str, Vec<&CompositeEdge>> = HashMap::new();
    for edge in &graph.edges {
        incoming.entry(edge.to.as_str()).or_default().push(edge);
    }

    let mut executed: HashMap<String, NodeResult> = HashMap::new();
    let mut ai_calls_used = 0u32;
    let mut ctx = StrategyContext { signal: base_signal, confidence: base_confidence, feature_snapshot };

    for node_id in &order {
        let node = nodes_by_id[node_id.as_str()];

        if let Some(edges) = incoming.get(node_id.as_str()) {
            let mut gated = false;
            let mut skip_reason = None;
            for edge in edges {
                let from_result = executed.get(&edge.from);
                let from_ok = match from_result {
                    Some(r) if r.executed => match edge.rule {
                        EdgeRule::Always => true,
                        EdgeRule::IfSignalNotNeutral => {
                            r.signal.map(|s| !s.is_neutral()).unwrap_or(false)
                        }
                        EdgeRule::IfConfidenceGte => {
                            r.confidence.unwrap_or(0.0) >= edge.confidence_gte.unwrap_or(f64::MAX)
                        }
                    },
                    _ => false,
                };
                if !from_ok {
                    gated = true;
                    skip_reason = Some(format!("edge_rule_not_satisfied:{}->{}", edge.from, node_id));
                    break;
                }
            }
            if gated {
                executed.insert(
                    node_id.clone(),
                    NodeResult {
                        node_id: node_id.clone(),
                        executed: false,
                        skipped_reason: skip_reason,
                        signal: None,
                        confidence: None,
                        outcome: None,
                    },
                );
                continue;
            }
        }

        match node.kind {
            NodeKind::Local => {
                let Some(handler) = registry.get(&node.ref_id) else {
                    executed.insert(
                        node_id.clone(),
                        NodeResult {
                            node_id: node_id.clone(),
                            executed: false,
                            skipped_reason: Some("unresolved_local_ref".to_string()),
                            signal: None,
                            confidence: None,
                            outcome: None,
                        },
                    );
                    continue;
                };
                let outcome = handler.evaluate(&ctx, &node.config_overrides);
                let out_signal = if outcome.allow { ctx.signal } else { Signal::Neutral };
                let out_confidence = if outcome.allow {
                    ctx.confidence.max(outcome.score)
                } else {
                    ctx.confidence.min(outcome.score)
                };
                ctx.signal = out_signal;
                ctx.confidence = out_confidence;
                executed.insert(
                    node_id.clone(),
                    NodeResult {
                        node_id: node_id.clone(),
                        executed: true,
                        skipped_reason: None,
                        signal: Some(out_signal),
                        confidence: Some(out_confidence),
                        outcome: Some(outcome),
                    },
                );
            }
            NodeKind::Ai => {
                if ai_calls_used >= 1 {
                    executed.insert(
                        node_id.clone(),
                        NodeResult {
                            node_id: node_id.clone(),
                            executed: false,
                            skipped_reason: Some("ai_call_budget_exceeded".to_string()),
                            signal: None,
                            confidence: None,
                            outcome: None,
                        },
                    );
                    continue;
                }
                match ai_invoker.invoke(&ctx, node) {
                    Some(outcome) => {
                        ai_calls_used += 1;
                        let ai_signal = parse_signal_from_outcome(&outcome).unwrap_or(ctx.signal);
                        if graph.output_policy != OutputPolicy::LocalSignalAiExplain {
                            ctx.signal = ai_signal;
                        }
                        ctx.confidence = ctx.confidence.max(outcome.score);
                        executed.insert(
                            node_id.clone(),
                            NodeResult {
                                node_id: node_id.clone(),
                                executed: true,
                                skipped_reason: None,
                                signal: Some(ai_signal),
                                confidence: Some(outcome.score),
                                outcome: Some(outcome),
                            },
                        );
                    }
                    None => {
                        executed.insert(
                            node_id.clone(),
                            NodeResult {
                                node_id: node_id.clone(),
                                executed: false,
                                skipped_reason: Some("ai_gate_blocked".to_string()),
                                signal: None,
                                confidence: None,
                                outcome: None,
                            },
                        );
                    }
                }
            }
        }
    }

    let node_results: Vec<NodeResult> = order.iter().map(|id| executed.remove(id).unwrap()).collect();

    let (final_signal, final_confidence, explanation) = derive_output(graph.output_policy, base_signal, base_confidence, &node_results);

    let mut tags: Vec<String> = Vec::new();
    let mut drivers: Vec<String> = Vec::new();
    for nr in &node_results {
        if let Some(outcome) = &nr.outcome {
            for t in &outcome.tags {
                if !tags.contains(t) {
                    tags.push(t.clone());
                }
            }
            if !outcome.explanation.is_empty() && !drivers.contains(&outcome.explanation) {
                drivers.push(outcome.explanation.clone());
            }
        }
    }
    tags.truncate(20);
    drivers.truncate(10);

    CompositeRunResult {
        valid: true,
        errors: vec![],
        warnings: vec![],
        signal: final_signal,
        confidence: final_confidence.clamp(0.0, 100.0),
        explanation,
        tags,
        key_drivers: drivers,
        node_results,
        ai_calls_used,
    }
}

fn parse_signal_from_outcome(outcome: &StrategyOutcome) -> Option<Signal> {
    outcome
        .meta
        .get("signal")
        .and_then(|v| v.as_str())
        .and_then(|s| match s {
            "up" => Some(Signal::Up),
            "down" => Some(Signal::Down),
            "neutral" => Some(Signal::Neutral),
            _ => None,
        })
}

/// §4.11 step 6.
fn derive_output(
    policy: OutputPolicy,
    base_signal: Signal,
    base_confidence: f64,
    node_results: &[NodeResult],
) -> (Signal, f64, String) {
    match policy {
        OutputPolicy::FirstNonNeutral => {
            for nr in node_results {
                if nr.executed {
                    if let Some(s) = nr.signal {
                        if !s.is_neutral() {
                            return (s, nr.confidence.unwrap_or(base_confidence), explanation_for(nr));
                        }
                    }
                }
            }
            (base_signal, base_confidence, String::new())
        }
        OutputPolicy::OverrideByConfidence => {
            let best = node_results
                .iter()
                .filter(|nr| nr.executed && nr.signal.map(|s| !s.is_neutral()).unwrap_or(false))
                .max_by(|a, b| {
                    a.confidence
                        .unwrap_or(0.0)
                        .partial_cmp(&b.confidence.unwrap_or(0.0))
                        .unwrap()
                });
            match best {
                Some(nr) => (nr.signal.unwrap(), nr.confidence.unwrap_or(base_confidence), explanation_for(nr)),
                None => (base_signal, base_confidence, String::new()),
            }
        }
        OutputPolicy::LocalSignalAiExplain => {
            let last_local_non_neutral = node_results
                .iter()
                .rev()
                .find(|nr| nr.executed && nr.outcome.is_some() && nr.signal.map(|s| !s.is_neutral()).unwrap_or(false));
            let (signal, confidence) = match last_local_non_neutral {
                Some(nr) => (nr.signal.unwrap(), nr.confidence.unwrap_or(base_confidence)),
                None => (base_signal, base_confidence),
            };
            let ai_explanation = node_results
                .iter()
                .filter(|nr| nr.executed)
                .find_map(|nr| nr.outcome.as_ref().map(|o| o.explanation.clone()))
                .unwrap_or_default();
            (signal, confidence, ai_explanation)
        }
    }
}

fn explanation_for(nr: &NodeResult) -> String {
    nr.outcome.as_ref().map(|o| o.explanation.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAi;
    impl AiNodeInvoker for NoopAi {
        fn invoke(&mut self, _ctx: &StrategyContext, _node: &CompositeNode) -> Option<StrategyOutcome> {
            Some(StrategyOutcome {
                allow: true,
                score: 70.0,
                reason_codes: vec![],
                tags: vec![],
                explanation: "ai explanation".to_string(),
                meta: serde_json::Value::Null,
            })
        }
    }

    fn node(id: &str, kind: NodeKind, ref_id: &str) -> CompositeNode {
        CompositeNode { id: id.to_string(), kind, ref_id: ref_id.to_string(), config_overrides: serde_json::Value::Null }
    }

    fn edge(from: &str, to: &str, rule: EdgeRule) -> CompositeEdge {
        CompositeEdge { from: from.to_string(), to: to.to_string(), rule, confidence_gte: None }
    }

    #[test]
    fn s4_at_most_one_ai_call_and_second_ai_node_is_skipped() {
        let graph = CompositeGraph {
            nodes: vec![
                node("A", NodeKind::Local, "regime_gate"),
                node("B", NodeKind::Ai, "explainer"),
                node("C", NodeKind::Ai, "explainer"),
            ],
            edges: vec![edge("A", "B", EdgeRule::Always), edge("B", "C", EdgeRule::Always)],
            combine_mode: CombineMode::Pipeline,
            output_policy: OutputPolicy::LocalSignalAiExplain,
        };

        let mut context_snapshot = FeatureSnapshot::new();
        context_snapshot.set("historyContext.reg.state", "trending_up");
        let registry = LocalStrategyRegistry::with_builtins();
        let mut ai = NoopAi;

        let result = run_composite_strategy(
            &graph,
            Signal::Up,
            60.0,
            context_snapshot,
            &registry,
            &mut ai,
        );

        assert_eq!(result.ai_calls_used, 1);
        let node_c = result.node_results.iter().find(|n| n.node_id == "C").unwrap();
        assert!(!node_c.executed);
        assert_eq!(node_c.skipped_reason.as_deref(), Some("ai_call_budget_exceeded"));
        assert!(result.explanation.contains("ai explanation"));
    }

    #[test]
    fn cyclic_graph_is_rejected() {
        let graph = CompositeGraph {
            nodes: vec![node("A", NodeKind::Local, "regime_gate"), node("B", NodeKind::Local, "signal_filter")],
            edges: vec![edge("A", "B", EdgeRule::Always), edge("B", "A", EdgeRule::Always)],
            combine_mode: CombineMode::Pipeline,
            output_policy: OutputPolicy::FirstNonNeutral,
        };
        let registry = LocalStrategyRegistry::with_builtins();
        let result = validate_graph(&graph, &registry);
        assert!(result.is_err());
    }

    #[test]
    fn self_loop_is_rejected() {
        let graph = CompositeGraph {
            nodes: vec![node("A", NodeKind::Local, "regime_gate")],
            edges: vec![edge("A", "A", EdgeRule::Always)],
            combine_mode: CombineMode::Pipeline,
            output_policy: OutputPolicy::FirstNonNeutral,
        };
        let registry = LocalStrategyRegistry::with_builtins();
        assert!(validate_graph(&graph, &registry).is_err());
    }

    #[test]
    fn unresolved_local_ref_blocks_node_but_graph_still_runs() {
        let graph = CompositeGraph {
            nodes: vec![node("A", NodeKind::Local, "does_not_exist")],
            edges: vec![],
            combine_mode: CombineMode::Pipeline,
            output_policy: OutputPolicy::FirstNonNeutral,
        };
        let registry = LocalStrategyRegistry::with_builtins();
        let mut ai = NoopAi;
        let result = run_composite_strategy(&graph, Signal::Up, 50.0, FeatureSnapshot::new(), &registry, &mut ai);
        assert!(!result.valid);
        assert!(result.node_results.is_empty());
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("does_not_exist")));
    }
}
