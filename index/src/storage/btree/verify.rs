//! Structural checks and statistics for a finalized tree.
//!
//! The walk is iterative and visits every node once. Each stack entry carries
//! the exclusive key bounds inherited from its ancestors, which is enough to
//! prove the whole in-order sequence is strictly ascending.

use crate::storage::btree::node::{Key, NULL_POINTER, Node, Pointer, min_keys};
use crate::storage::btree::tree::{MAX_HEIGHT, Tree, TreeError};
use crate::storage::io::Storage;

/// Shape and fill of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub order: u32,
    pub root: Pointer,
    /// Levels, counting the leaf level.
    pub height: usize,
    pub nodes: u64,
    pub leaves: u64,
    pub keys: u64,
    /// Minimum keys a non-root node must hold.
    pub min_keys: usize,
    /// Fewest keys found in a non-root node, `None` for a single-node tree.
    pub min_fill: Option<usize>,
}

/// A broken tree invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub pointer: Pointer,
    pub reason: String,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node {}: {}", self.pointer, self.reason)
    }
}

impl std::error::Error for InvariantViolation {}

/// Error type for `Tree::verify`.
#[derive(Debug)]
pub enum VerifyError {
    /// The tree could not be read.
    Tree(TreeError),
    /// The tree was read but is not valid.
    Violation(InvariantViolation),
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree(e) => write!(f, "tree error: {e}"),
            Self::Violation(v) => write!(f, "invariant violated at {v}"),
        }
    }
}

impl std::error::Error for VerifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tree(e) => Some(e),
            Self::Violation(v) => Some(v),
        }
    }
}

impl From<TreeError> for VerifyError {
    fn from(e: TreeError) -> Self {
        Self::Tree(e)
    }
}

impl From<InvariantViolation> for VerifyError {
    fn from(v: InvariantViolation) -> Self {
        Self::Violation(v)
    }
}

struct Visit {
    pointer: Pointer,
    parent: Pointer,
    depth: usize,
    lower: Option<Key>,
    upper: Option<Key>,
}

impl<S: Storage> Tree<S> {
    /// Collect statistics without enforcing invariants.
    pub fn inspect(&mut self) -> Result<TreeStats, TreeError> {
        match self.walk(false) {
            Ok(stats) => Ok(stats),
            Err(VerifyError::Tree(e)) => Err(e),
            // Not produced when checks are off.
            Err(VerifyError::Violation(v)) => Err(TreeError::Corrupted(v.to_string())),
        }
    }

    /// Check every invariant of a finalized tree and return its statistics.
    pub fn verify(&mut self) -> Result<TreeStats, VerifyError> {
        let stats = self.walk(true)?;
        tracing::debug!(
            nodes = stats.nodes,
            keys = stats.keys,
            height = stats.height,
            "index verified"
        );
        Ok(stats)
    }

    fn walk(&mut self, strict: bool) -> Result<TreeStats, VerifyError> {
        let order = self.order();
        let root = self.root();
        let mut stats = TreeStats {
            order,
            root,
            height: 0,
            nodes: 0,
            leaves: 0,
            keys: 0,
            min_keys: min_keys(order),
            min_fill: None,
        };

        let mut stack = vec![Visit {
            pointer: root,
            parent: NULL_POINTER,
            depth: 0,
            lower: None,
            upper: None,
        }];

        while let Some(visit) = stack.pop() {
            if visit.depth >= MAX_HEIGHT {
                return Err(TreeError::Corrupted(format!(
                    "node {} is deeper than {MAX_HEIGHT} levels",
                    visit.pointer
                ))
                .into());
            }

            let node = self.store_mut().read_node(visit.pointer)?;
            if strict {
                check_node(&node, &visit, &stats)?;
            }

            stats.nodes += 1;
            stats.keys += node.keys_count as u64;
            if visit.pointer != root {
                stats.min_fill = Some(
                    stats
                        .min_fill
                        .map_or(node.keys_count, |fill| fill.min(node.keys_count)),
                );
            }

            if node.is_leaf {
                stats.leaves += 1;
                let depth = visit.depth + 1;
                if stats.height == 0 {
                    stats.height = depth;
                } else if strict && stats.height != depth {
                    return Err(violation(
                        visit.pointer,
                        format!("leaf at depth {depth}, expected {}", stats.height),
                    )
                    .into());
                }
                continue;
            }

            // Push right to left so children are visited left to right.
            let children = if strict {
                node.keys_count + 1
            } else {
                node.children_count()
            };
            for index in (0..children).rev() {
                let lower = if index == 0 {
                    visit.lower
                } else {
                    node.keys.get(index - 1).copied()
                };
                let upper = if index < node.keys_count {
                    Some(node.keys[index])
                } else {
                    visit.upper
                };
                stack.push(Visit {
                    pointer: node.children[index],
                    parent: visit.pointer,
                    depth: visit.depth + 1,
                    lower,
                    upper,
                });
            }
        }

        Ok(stats)
    }
}

fn check_node(node: &Node, visit: &Visit, stats: &TreeStats) -> Result<(), InvariantViolation> {
    let pointer = visit.pointer;
    let order = stats.order as usize;
    let is_root = visit.parent == NULL_POINTER;

    if node.parent != visit.parent {
        return Err(violation(
            pointer,
            format!("parent is {}, expected {}", node.parent, visit.parent),
        ));
    }

    if !is_root && (node.keys_count < stats.min_keys || node.keys_count > order) {
        return Err(violation(
            pointer,
            format!(
                "holds {} keys, allowed {}..={order}",
                node.keys_count, stats.min_keys
            ),
        ));
    }
    if is_root && !node.is_leaf && node.keys_count == 0 {
        return Err(violation(pointer, "internal root has no keys".to_string()));
    }

    let keys = node.valid_keys();
    if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(violation(pointer, "keys are not strictly ascending".to_string()));
    }
    if let (Some(lower), Some(first)) = (visit.lower, keys.first())
        && *first <= lower
    {
        return Err(violation(pointer, "key below the subtree's lower bound".to_string()));
    }
    if let (Some(upper), Some(last)) = (visit.upper, keys.last())
        && *last >= upper
    {
        return Err(violation(pointer, "key above the subtree's upper bound".to_string()));
    }

    let populated = if node.is_leaf { 0 } else { node.keys_count + 1 };
    for (index, &child) in node.children.iter().enumerate() {
        let expected_set = index < populated;
        if expected_set == (child == NULL_POINTER) {
            return Err(violation(
                pointer,
                format!(
                    "child slot {index} is {}, expected {} populated children",
                    if child == NULL_POINTER { "empty" } else { "set" },
                    populated
                ),
            ));
        }
    }

    Ok(())
}

const fn violation(pointer: Pointer, reason: String) -> InvariantViolation {
    InvariantViolation { pointer, reason }
}
