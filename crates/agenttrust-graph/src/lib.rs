//! Causal graph construction over an agent's execution chain: wiring parent
//! links into a tree, walking root-to-node chains, and picking a blame root
//! with contributing factors for an incident.

#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};

use agenttrust_consistency::{Divergence, DivergenceType};
use agenttrust_proto::{ActionType, ClaimRecord, ExecutionRecord};
use agenttrust_rules::RuleMatch;

/// One execution in the graph, with its chain position and any rule/claim
/// findings already attached by the caller.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub entry: ExecutionRecord,
    pub claim: Option<ClaimRecord>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub depth: usize,
    pub rule_matches: Vec<RuleMatch>,
    pub consistency_finding: Option<Divergence>,
    pub is_blame_root: bool,
}

/// The full node arena plus its roots and maximum depth.
#[derive(Debug, Clone)]
pub struct CausalGraph {
    pub nodes: Vec<GraphNode>,
    pub roots: Vec<usize>,
    pub max_depth: usize,
}

impl CausalGraph {
    fn index_of(&self, entry_id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.entry.id.to_string() == entry_id)
    }
}

/// Build a causal graph from a flat list of executions plus per-entry rule
/// matches, consistency findings, and paired claims. Entries whose
/// `context.parentAction` is absent, or doesn't resolve to another entry in
/// this set, become roots.
pub fn build_graph(
    entries: &[ExecutionRecord],
    rule_matches_by_entry: &HashMap<String, Vec<RuleMatch>>,
    findings_by_entry: &HashMap<String, Divergence>,
    claims_by_entry: &HashMap<String, ClaimRecord>,
) -> CausalGraph {
    let mut nodes: Vec<GraphNode> = entries
        .iter()
        .map(|entry| {
            let id = entry.id.to_string();
            GraphNode {
                entry: entry.clone(),
                claim: claims_by_entry.get(&id).cloned(),
                parent: None,
                children: Vec::new(),
                depth: 0,
                rule_matches: rule_matches_by_entry.get(&id).cloned().unwrap_or_default(),
                consistency_finding: findings_by_entry.get(&id).cloned(),
                is_blame_root: false,
            }
        })
        .collect();

    let index_by_id: HashMap<String, usize> = nodes.iter().enumerate().map(|(i, n)| (n.entry.id.to_string(), i)).collect();

    for i in 0..nodes.len() {
        let parent_idx = nodes[i].entry.payload.context.parent_action.and_then(|pid| index_by_id.get(&pid.to_string()).copied());
        if let Some(pi) = parent_idx {
            if pi != i {
                nodes[i].parent = Some(pi);
            }
        }
    }
    for i in 0..nodes.len() {
        if let Some(pi) = nodes[i].parent {
            nodes[pi].children.push(i);
        }
    }

    let roots: Vec<usize> = (0..nodes.len()).filter(|&i| nodes[i].parent.is_none()).collect();

    let mut max_depth = 0;
    let mut queue: VecDeque<usize> = VecDeque::new();
    for &r in &roots {
        nodes[r].depth = 0;
        queue.push_back(r);
    }
    while let Some(i) = queue.pop_front() {
        let depth = nodes[i].depth;
        max_depth = max_depth.max(depth);
        let children = nodes[i].children.clone();
        for c in children {
            nodes[c].depth = depth + 1;
            queue.push_back(c);
        }
    }

    CausalGraph { nodes, roots, max_depth }
}

/// The root-to-node path for `entry_id`, oldest first.
pub fn get_chain<'a>(graph: &'a CausalGraph, entry_id: &str) -> Vec<&'a GraphNode> {
    let Some(start) = graph.index_of(entry_id) else { return Vec::new() };
    let mut chain = Vec::new();
    let mut cursor = Some(start);
    while let Some(i) = cursor {
        chain.push(i);
        cursor = graph.nodes[i].parent;
    }
    chain.reverse();
    chain.into_iter().map(|i| &graph.nodes[i]).collect()
}

/// A single contributing factor in a blame analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlameFactor {
    Escalation { entry_id: String, action_type: String },
    ScopeDrift { entry_id: String, finding: String },
    MissingClaim { entry_id: String },
    RuleViolation { entry_id: String, rule_id: String, rule_name: String },
    Trigger { entry_id: String, trigger: String },
}

/// The result of `analyze_blame`: which node is at fault, why, and what to
/// do about it.
#[derive(Debug, Clone)]
pub struct BlameAnalysis {
    pub incident_id: String,
    pub blame_root_id: String,
    pub chain_ids: Vec<String>,
    pub factors: Vec<BlameFactor>,
    pub narrative: String,
    pub recommendation: Vec<String>,
}

const SCOPE_DRIFT_KINDS: [DivergenceType; 4] =
    [DivergenceType::TargetMismatch, DivergenceType::ActionTypeMismatch, DivergenceType::RiskUnderestimate, DivergenceType::ScopeViolation];

fn is_escalation(action_type: ActionType) -> bool {
    action_type.starts_with("elevated.") || action_type.starts_with("payment.")
}

/// Walk the chain to `incident_id`, pick the blame root (first node with
/// rule matches, or the incident itself), collect contributing factors, and
/// render a deterministic narrative and recommendation.
pub fn analyze_blame(graph: &CausalGraph, incident_id: &str) -> BlameAnalysis {
    let chain = get_chain(graph, incident_id);
    let blame_root = chain.iter().find(|n| !n.rule_matches.is_empty()).copied().or_else(|| chain.last().copied());

    let blame_root_id = blame_root.map(|n| n.entry.id.to_string()).unwrap_or_else(|| incident_id.to_string());

    let mut factors = Vec::new();
    for node in &chain {
        let entry_id = node.entry.id.to_string();
        let action_type = node.entry.payload.action.action_type;

        if is_escalation(action_type) {
            factors.push(BlameFactor::Escalation { entry_id: entry_id.clone(), action_type: action_type.as_str().to_string() });
        }

        if let Some(finding) = &node.consistency_finding {
            if SCOPE_DRIFT_KINDS.contains(&finding.kind) {
                factors.push(BlameFactor::ScopeDrift { entry_id: entry_id.clone(), finding: finding.detail.clone() });
            }
        }

        if node.claim.is_none() && !node.rule_matches.is_empty() {
            factors.push(BlameFactor::MissingClaim { entry_id: entry_id.clone() });
        }

        for rule_match in &node.rule_matches {
            factors.push(BlameFactor::RuleViolation { entry_id: entry_id.clone(), rule_id: rule_match.rule_id.clone(), rule_name: rule_match.rule_name.clone() });
        }
    }

    if let Some(root_node) = chain.first() {
        let trigger = root_node.entry.payload.context.trigger.clone();
        if trigger == "inbound_message" || trigger == "chain" {
            factors.push(BlameFactor::Trigger { entry_id: root_node.entry.id.to_string(), trigger });
        }
    }

    let narrative = build_narrative(&chain, &blame_root_id, &factors);
    let recommendation = build_recommendation(&factors);

    BlameAnalysis {
        incident_id: incident_id.to_string(),
        blame_root_id,
        chain_ids: chain.iter().map(|n| n.entry.id.to_string()).collect(),
        factors,
        narrative,
        recommendation,
    }
}

fn build_narrative(chain: &[&GraphNode], blame_root_id: &str, factors: &[BlameFactor]) -> String {
    let rule_violations = factors.iter().filter(|f| matches!(f, BlameFactor::RuleViolation { .. })).count();
    let escalations = factors.iter().filter(|f| matches!(f, BlameFactor::Escalation { .. })).count();
    let scope_drifts = factors.iter().filter(|f| matches!(f, BlameFactor::ScopeDrift { .. })).count();

    let mut parts = vec![format!("Chain of {} action(s) traced back to {}.", chain.len(), blame_root_id)];

    if rule_violations > 0 {
        parts.push(format!("{} rule violation(s) detected along the chain.", rule_violations));
    }
    if escalations > 0 {
        parts.push(format!("{} privilege/payment escalation(s) involved.", escalations));
    }
    if scope_drifts > 0 {
        parts.push(format!("{} scope-drift finding(s) identified.", scope_drifts));
    }
    if factors.iter().any(|f| matches!(f, BlameFactor::MissingClaim { .. })) {
        parts.push("At least one flagged action had no paired claim.".to_string());
    }
    if factors.is_empty() {
        parts.push("No contributing factors identified; incident stands on its own.".to_string());
    }

    parts.join(" ")
}

fn build_recommendation(factors: &[BlameFactor]) -> Vec<String> {
    let mut steps = Vec::new();

    if factors.iter().any(|f| matches!(f, BlameFactor::Escalation { .. })) {
        steps.push("Review the escalation/payment step for authorization before it ran".to_string());
    }
    if factors.iter().any(|f| matches!(f, BlameFactor::ScopeDrift { .. })) {
        steps.push("Audit the claim constraints that this chain violated".to_string());
    }
    if factors.iter().any(|f| matches!(f, BlameFactor::MissingClaim { .. })) {
        steps.push("Require a claim before allowing this action type to proceed unclaimed".to_string());
    }
    if factors.iter().any(|f| matches!(f, BlameFactor::RuleViolation { .. })) {
        steps.push("Review the triggered rule(s) for tuning or enforcement changes".to_string());
    }
    if factors.iter().any(|f| matches!(f, BlameFactor::Trigger { .. })) {
        steps.push("Confirm the inbound trigger source is still trusted".to_string());
    }
    if steps.is_empty() {
        steps.push("No remediation indicated by this chain".to_string());
    }

    steps
}
