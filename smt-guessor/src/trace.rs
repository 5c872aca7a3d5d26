// trace.rs
//
// Flattens (plan, results) pairs into observation nodes and transition steps.
// - node: one per (trace, t), t = 0..=plan.len()
// - step: one per door taken, linking node (trace, t) to (trace, t+1)
// Node indices are global and contiguous per trace.

use serde::{Deserialize, Serialize};

use crate::error::MalformedInput;

pub type Label = u8; // 0..=3
pub type Door = u8; // 0..=5

pub const DOOR_COUNT: usize = 6;
pub const LABEL_COUNT: i64 = 4;

/// Input document: `{"plans": [...], "results": [[...], ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceInput {
    pub plans: Vec<String>,
    pub results: Vec<Vec<i64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationNode {
    pub trace: usize,
    pub t: usize,
    pub label: Label,
    pub idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionStep {
    pub src: usize,
    pub dst: usize,
    pub door: Door,
}

#[derive(Debug, Clone)]
pub struct TraceModel {
    pub nodes: Vec<ObservationNode>,
    pub steps: Vec<TransitionStep>,
    /// Global index of each trace's t=0 node.
    pub start_nodes: Vec<usize>,
    /// Normalised plans, kept for replay checks.
    pub plans: Vec<Vec<Door>>,
}

impl TraceModel {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn label(&self, idx: usize) -> Label {
        self.nodes[idx].label
    }

    pub fn labels(&self, trace: usize) -> impl Iterator<Item = Label> + '_ {
        self.nodes
            .iter()
            .filter(move |n| n.trace == trace)
            .map(|n| n.label)
    }
}

/// Plan string to zero-indexed doors.
///
/// All digits in '0'..='5' is read as zero-indexed; otherwise all digits in
/// '1'..='6' is read as one-indexed. So "2" or "11" stay zero-indexed.
pub fn normalize_plan(plan: &str) -> Option<Vec<Door>> {
    if plan.bytes().all(|c| (b'0'..=b'5').contains(&c)) {
        return Some(plan.bytes().map(|c| c - b'0').collect());
    }
    if plan.bytes().all(|c| (b'1'..=b'6').contains(&c)) {
        return Some(plan.bytes().map(|c| c - b'1').collect());
    }
    None
}

pub fn build_trace_model(input: &TraceInput) -> Result<TraceModel, MalformedInput> {
    if input.plans.is_empty() && input.results.is_empty() {
        return Err(MalformedInput::NoTraces);
    }
    if input.plans.len() != input.results.len() {
        return Err(MalformedInput::PlanCountMismatch {
            plans: input.plans.len(),
            results: input.results.len(),
        });
    }

    let mut nodes = Vec::new();
    let mut steps = Vec::new();
    let mut start_nodes = Vec::with_capacity(input.plans.len());
    let mut plans = Vec::with_capacity(input.plans.len());

    for (i, (raw, obs)) in input.plans.iter().zip(&input.results).enumerate() {
        let plan = normalize_plan(raw).ok_or_else(|| MalformedInput::BadDoor {
            idx: i,
            plan: raw.clone(),
        })?;
        if obs.len() != plan.len() + 1 {
            return Err(MalformedInput::ResultLength {
                idx: i,
                plan_len: plan.len(),
                obs_len: obs.len(),
            });
        }

        let base = nodes.len();
        start_nodes.push(base);
        for (t, &value) in obs.iter().enumerate() {
            if !(0..LABEL_COUNT).contains(&value) {
                return Err(MalformedInput::BadLabel {
                    idx: i,
                    pos: t,
                    value,
                });
            }
            nodes.push(ObservationNode {
                trace: i,
                t,
                label: value as Label,
                idx: base + t,
            });
        }
        for (t, &door) in plan.iter().enumerate() {
            steps.push(TransitionStep {
                src: base + t,
                dst: base + t + 1,
                door,
            });
        }
        plans.push(plan);
    }

    Ok(TraceModel {
        nodes,
        steps,
        start_nodes,
        plans,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(plans: &[&str], results: &[&[i64]]) -> TraceInput {
        TraceInput {
            plans: plans.iter().map(|p| p.to_string()).collect(),
            results: results.iter().map(|r| r.to_vec()).collect(),
        }
    }

    #[test]
    fn normalizes_both_door_alphabets() {
        assert_eq!(normalize_plan("0325"), Some(vec![0, 3, 2, 5]));
        assert_eq!(normalize_plan("16"), Some(vec![0, 5]));
        // ambiguous strings stay zero-indexed
        assert_eq!(normalize_plan("11"), Some(vec![1, 1]));
        assert_eq!(normalize_plan(""), Some(vec![]));
        assert_eq!(normalize_plan("06"), None);
        assert_eq!(normalize_plan("7"), None);
    }

    #[test]
    fn builds_nodes_and_steps_per_trace() {
        let model = build_trace_model(&input(&["0", "00"], &[&[0, 1], &[0, 1, 0]])).unwrap();
        assert_eq!(model.node_count(), 5);
        assert_eq!(model.start_nodes, vec![0, 2]);
        assert_eq!(
            model.steps,
            vec![
                TransitionStep { src: 0, dst: 1, door: 0 },
                TransitionStep { src: 2, dst: 3, door: 0 },
                TransitionStep { src: 3, dst: 4, door: 0 },
            ]
        );
        assert_eq!(model.nodes[3].trace, 1);
        assert_eq!(model.nodes[3].t, 1);
        assert_eq!(model.labels(1).collect::<Vec<_>>(), vec![0, 1, 0]);
    }

    #[test]
    fn one_indexed_plans_are_shifted() {
        let model = build_trace_model(&input(&["62"], &[&[0, 1, 2]])).unwrap();
        assert_eq!(model.steps[0].door, 5);
        assert_eq!(model.steps[1].door, 1);
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = build_trace_model(&input(&["01"], &[&[0, 1]])).unwrap_err();
        assert_eq!(
            err,
            MalformedInput::ResultLength { idx: 0, plan_len: 2, obs_len: 2 }
        );
    }

    #[test]
    fn rejects_bad_labels_and_doors() {
        assert!(matches!(
            build_trace_model(&input(&["0"], &[&[0, 4]])),
            Err(MalformedInput::BadLabel { idx: 0, pos: 1, value: 4 })
        ));
        assert!(matches!(
            build_trace_model(&input(&["9"], &[&[0, 1]])),
            Err(MalformedInput::BadDoor { idx: 0, .. })
        ));
        assert!(matches!(
            build_trace_model(&input(&["0", "1"], &[&[0, 1]])),
            Err(MalformedInput::PlanCountMismatch { plans: 2, results: 1 })
        ));
    }

    #[test]
    fn rejects_empty_trace_set() {
        assert_eq!(
            build_trace_model(&input(&[], &[])).unwrap_err(),
            MalformedInput::NoTraces
        );
    }

    #[test]
    fn parses_json_document() {
        let doc: TraceInput =
            serde_json::from_str(r#"{"plans":["0325","510"],"results":[[0,2,1,3,0],[0,1,0,2]]}"#)
                .unwrap();
        let model = build_trace_model(&doc).unwrap();
        assert_eq!(model.node_count(), 9);
        assert_eq!(model.steps.len(), 7);
    }
}
