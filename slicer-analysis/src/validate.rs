//! Structural validator (§6.5, §7 item 3). Runs independently of
//! construction and the analysis drivers, and is never called by either —
//! callers decide when to validate and what to do with the result. The
//! validator logs nothing itself; it only returns data.

use slicer_graph::{NodeId, PointerGraph, PsNodeTag};
use std::collections::{HashSet, VecDeque};

/// One structural defect, tied to the offending node and (when relevant)
/// the operand that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub node: NodeId,
    pub operand: Option<NodeId>,
    pub message: String,
}

/// `(errors, warnings)` per §6.5: a graph is sound to analyse only once
/// `errors` is empty. `warnings` flag suspicious but not fatal shapes.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ValidationReport {
    pub fn is_sound(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Tags whose result a `Phi` may legitimately merge. Nodes with no pointer
/// result of their own (`Store`, `Memcpy`, `Return`, `Free`, the
/// invalidation ops, `Noop`) are structural defects as a `Phi` operand.
fn produces_pointer_value(tag: &PsNodeTag) -> bool {
    !matches!(
        tag,
        PsNodeTag::Store
            | PsNodeTag::Memcpy { .. }
            | PsNodeTag::Return
            | PsNodeTag::Free
            | PsNodeTag::InvalidateObject
            | PsNodeTag::InvalidateLocals
            | PsNodeTag::Noop
    )
}

fn reachable_from_entries(graph: &PointerGraph) -> HashSet<NodeId> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    let roots = graph
        .entry()
        .into_iter()
        .chain(graph.subgraphs().map(|s| s.entry))
        .chain(graph.globals().iter().copied())
        .chain([graph.null_node(), graph.unknown_node(), graph.invalidated_node()]);
    for root in roots {
        if seen.insert(root) {
            queue.push_back(root);
        }
    }

    while let Some(n) = queue.pop_front() {
        let Ok(node) = graph.get(n) else { continue };
        let neighbours = node
            .base()
            .successors()
            .iter()
            .chain(node.base().users())
            .chain(node.base().operands())
            .copied();
        for next in neighbours {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
        for &callee_entry in graph.callees(n) {
            if seen.insert(callee_entry) {
                queue.push_back(callee_entry);
            }
        }
    }
    seen
}

pub fn validate(graph: &PointerGraph) -> ValidationReport {
    let mut report = ValidationReport::default();

    for node in graph.node_ids() {
        let n = graph.get(node).expect("node_ids yields only live ids");

        if let Some(expected) = n.tag.expected_operand_count() {
            let actual = n.base().operands().len();
            if actual != expected {
                report.errors.push(Finding {
                    node,
                    operand: None,
                    message: format!(
                        "{} expects {expected} operand(s), has {actual}",
                        n.tag.name()
                    ),
                });
            }
        }

        for &operand in n.base().operands() {
            match graph.get(operand) {
                Err(_) => report.errors.push(Finding {
                    node,
                    operand: Some(operand),
                    message: format!("operand {operand} does not exist"),
                }),
                Ok(op) if matches!(n.tag, PsNodeTag::Phi) && !produces_pointer_value(&op.tag) => {
                    report.errors.push(Finding {
                        node,
                        operand: Some(operand),
                        message: format!("phi operand {operand} ({}) has no pointer value to merge", op.tag.name()),
                    });
                }
                Ok(_) => {}
            }
        }

        let mut seen_successors = HashSet::new();
        for &succ in n.base().successors() {
            if graph.get(succ).is_err() {
                report.errors.push(Finding {
                    node,
                    operand: Some(succ),
                    message: format!("successor {succ} does not exist"),
                });
            } else if !seen_successors.insert(succ) {
                report.warnings.push(Finding {
                    node,
                    operand: Some(succ),
                    message: format!("successor edge to {succ} registered more than once"),
                });
            }
        }
    }

    let reachable = reachable_from_entries(graph);
    for node in graph.node_ids() {
        if !reachable.contains(&node) {
            report.warnings.push(Finding {
                node,
                operand: None,
                message: "unreachable from any entry, global, or call target".to_string(),
            });
        }
    }

    report
}
