//! Greedy transitive grouping
//!
//! Every unordered pair of equal-length codes is correlated, and the pairs
//! above the threshold become edges of a graph. Groups are then grown
//! greedily from those edges, giving an approximate clique cover. The result
//! depends on edge order, so edges are always walked in ascending
//! (`DayKey`, `DayKey`) order.

use itertools::Itertools;
use statrs::statistics::Statistics;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, trace};

use super::{log_grouping, numeric_vectors, pearson, ClusteringStrategy, DayRecords, GroupRow};
use crate::error::PatternError;
use crate::DayKey;

/// Retained correlation edges between record indices
#[derive(Debug, Clone, Default)]
pub struct CorrelationGraph {
    /// Edges in discovery order, each stored as `(low, high)`
    edges: Vec<(usize, usize)>,
    weights: HashMap<(usize, usize), f64>,
}

impl CorrelationGraph {
    /// Correlate every pair of vectors and keep pairs strictly above `threshold`.
    ///
    /// Pairs of different length are skipped, not scored.
    pub fn build(vectors: &[Vec<f64>], threshold: f64) -> Self {
        let mut graph = Self::default();
        let mut mismatched = 0usize;

        for (i, j) in (0..vectors.len()).tuple_combinations() {
            match pearson(&vectors[i], &vectors[j]) {
                Ok(Some(r)) if r > threshold => {
                    graph.edges.push((i, j));
                    graph.weights.insert((i, j), r);
                }
                Ok(_) => {}
                Err(PatternError::LengthMismatch { left, right }) => {
                    trace!("pair ({}, {}) skipped: length {} vs {}", i, j, left, right);
                    mismatched += 1;
                }
                Err(e) => trace!("pair ({}, {}) skipped: {}", i, j, e),
            }
        }

        debug!(
            "Correlation graph: {} vectors, {} edges, {} length-mismatched pairs",
            vectors.len(),
            graph.edges.len(),
            mismatched
        );
        graph
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn weight(&self, a: usize, b: usize) -> Option<f64> {
        self.weights.get(&(a.min(b), a.max(b))).copied()
    }

    /// Whether `a` and `b` share a retained edge at or above `threshold`.
    /// A node is never adjacent to itself.
    pub fn is_adjacent(&self, a: usize, b: usize, threshold: f64) -> bool {
        self.weight(a, b).is_some_and(|w| w >= threshold)
    }

    /// Greedy clique cover.
    ///
    /// Each edge `(a, b)` joins the first group whose every member is
    /// adjacent to both `a` and `b`; otherwise it starts a new group.
    pub fn greedy_groups(&self, threshold: f64) -> Vec<BTreeSet<usize>> {
        let mut groups: Vec<BTreeSet<usize>> = Vec::new();

        for &(a, b) in &self.edges {
            let home = groups.iter_mut().find(|group| {
                group
                    .iter()
                    .all(|&m| self.is_adjacent(a, m, threshold) && self.is_adjacent(b, m, threshold))
            });

            match home {
                Some(group) => {
                    group.insert(a);
                    group.insert(b);
                }
                None => groups.push(BTreeSet::from([a, b])),
            }
        }

        groups
    }

    /// Mean weight over the group's internal edges that are present.
    pub fn average_weight(&self, group: &BTreeSet<usize>) -> f64 {
        let weights: Vec<f64> = group
            .iter()
            .tuple_combinations()
            .filter_map(|(&a, &b)| self.weight(a, b))
            .collect();
        weights.mean()
    }
}

/// Strategy A: greedy grouping over retained correlation pairs
#[derive(Debug, Clone, Copy)]
pub struct GreedyClustering {
    pub threshold: f64,
}

impl GreedyClustering {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for GreedyClustering {
    fn default() -> Self {
        Self::new(super::DEFAULT_CORRELATION_THRESHOLD)
    }
}

impl ClusteringStrategy for GreedyClustering {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn group(&self, records: &DayRecords) -> Vec<GroupRow> {
        let entries: Vec<_> = records.iter().collect();
        let vectors = numeric_vectors(records);
        let graph = CorrelationGraph::build(&vectors, self.threshold);
        let groups = graph.greedy_groups(self.threshold);

        let mut seen: HashSet<(Vec<usize>, &DayKey)> = HashSet::new();
        let mut rows = Vec::new();

        for group in &groups {
            let members: Vec<usize> = group.iter().copied().collect();
            let label = members.iter().map(|&i| entries[i].0.to_string()).join(" ");
            let average = graph.average_weight(group);

            for &i in &members {
                let (key, record) = entries[i];
                if seen.insert((members.clone(), key)) {
                    rows.push(GroupRow::new(label.clone(), average, key, record));
                }
            }
        }

        log_grouping(self.name(), records.len(), &rows);
        rows
    }
}
