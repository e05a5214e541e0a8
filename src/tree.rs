//! Parent-pointer tree reconstruction for a single trace.
//!
//! Two passes over the flat observation list: an id lookup built in input
//! order, then child attachment in the same order so siblings keep their
//! retrieval order. Assembly is iterative with a visited set, so any
//! parent-pointer input terminates.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::Observation;

/// An observation plus its nested children, rooted at the trace root.
#[derive(Debug, Serialize)]
pub struct ObservationNode {
    #[serde(flatten)]
    pub observation: Observation,
    pub children: Vec<ObservationNode>,
}

impl ObservationNode {
    fn leaf(observation: Observation) -> Self {
        Self {
            observation,
            children: Vec::new(),
        }
    }
}

/// Result of reconstructing one trace.
#[derive(Debug, Serialize)]
pub struct TraceTree {
    pub root: ObservationNode,
    /// Ids whose declared parent does not exist in this observation set.
    /// They stay in flat views but are excluded from the nested tree.
    pub orphaned: Vec<String>,
}

/// Index of the root observation: the first one (in retrieval order) with
/// an empty parent pointer, else the first observation overall. `None` only
/// for an empty set.
pub fn root_index(observations: &[Observation]) -> Option<usize> {
    if observations.is_empty() {
        return None;
    }
    Some(
        observations
            .iter()
            .position(Observation::is_root_candidate)
            .unwrap_or(0),
    )
}

/// The root observation itself, per the same rule.
pub fn root(observations: &[Observation]) -> Option<&Observation> {
    root_index(observations).map(|i| &observations[i])
}

/// Reconstruct the nested tree for one trace. Empty input yields `None`,
/// which callers surface as "no data" rather than an empty tree.
pub fn build(observations: &[Observation]) -> Option<TraceTree> {
    let root = root_index(observations)?;

    let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(observations.len());
    for (i, obs) in observations.iter().enumerate() {
        // first occurrence wins on duplicate ids
        index_of.entry(obs.id.as_str()).or_insert(i);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); observations.len()];
    let mut orphaned = Vec::new();

    for (i, obs) in observations.iter().enumerate() {
        let Some(parent_id) = obs
            .parent_observation_id
            .as_deref()
            .filter(|p| !p.is_empty())
        else {
            continue;
        };
        if parent_id == obs.id {
            tracing::warn!(id = %obs.id, "observation declares itself as parent, leaving detached");
            continue;
        }
        // the chosen root stays at the top even if its parent pointer resolves
        if i == root {
            continue;
        }
        match index_of.get(parent_id) {
            Some(&parent) => children[parent].push(i),
            None => {
                tracing::warn!(
                    id = %obs.id,
                    parent_id = %parent_id,
                    "parent observation not found, excluding from tree"
                );
                orphaned.push(obs.id.clone());
            }
        }
    }

    assemble(observations, &children, root).map(|root| TraceTree { root, orphaned })
}

struct Frame {
    index: usize,
    cursor: usize,
    node: ObservationNode,
}

/// Depth-first assembly of owned nodes with an explicit stack. The visited
/// set breaks any cycle a malformed parent chain could otherwise form.
fn assemble(
    observations: &[Observation],
    children: &[Vec<usize>],
    root: usize,
) -> Option<ObservationNode> {
    let mut visited = vec![false; observations.len()];
    visited[root] = true;

    let mut stack = vec![Frame {
        index: root,
        cursor: 0,
        node: ObservationNode::leaf(observations[root].clone()),
    }];
    let mut finished = None;

    while let Some(Frame { index, cursor, node }) = stack.pop() {
        match children[index].get(cursor) {
            Some(&child) => {
                stack.push(Frame {
                    index,
                    cursor: cursor + 1,
                    node,
                });
                if !visited[child] {
                    visited[child] = true;
                    stack.push(Frame {
                        index: child,
                        cursor: 0,
                        node: ObservationNode::leaf(observations[child].clone()),
                    });
                }
            }
            None => match stack.last_mut() {
                Some(parent) => parent.node.children.push(node),
                None => finished = Some(node),
            },
        }
    }

    finished
}
