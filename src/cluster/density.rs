//! Density-based clustering (DBSCAN) over a precomputed correlation matrix
//!
//! Distance is `1 - correlation`, the neighbourhood radius is
//! `1 - threshold`, and a point is a core point when its neighbourhood
//! (itself included) holds at least `min_samples` points. Points reachable
//! from no core point are noise and are left out of the output.
//!
//! Pairs with no defined correlation (different code lengths, or a constant
//! code) are stored as NaN. A NaN distance is never within the radius, so
//! such a pair can never link two days.

use statrs::statistics::Statistics;
use tracing::trace;

use super::{log_grouping, numeric_vectors, pearson, ClusteringStrategy, DayRecords, GroupRow};

/// Full symmetric correlation matrix; the diagonal is 1 and undefined pairs are NaN.
pub fn correlation_matrix(vectors: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = vectors.len();
    let mut matrix = vec![vec![f64::NAN; n]; n];

    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let r = match pearson(&vectors[i], &vectors[j]) {
                Ok(Some(r)) => r,
                Ok(None) => f64::NAN,
                Err(e) => {
                    trace!("pair ({}, {}) undefined: {}", i, j, e);
                    f64::NAN
                }
            };
            matrix[i][j] = r;
            matrix[j][i] = r;
        }
    }

    matrix
}

/// DBSCAN over a precomputed distance matrix.
///
/// Returns one label per point: `Some(cluster)` with clusters numbered from
/// 0 in order of discovery, or `None` for noise. Points are scanned in index
/// order and border points go to the first cluster that reaches them.
pub fn dbscan(distances: &[Vec<f64>], eps: f64, min_samples: usize) -> Vec<Option<usize>> {
    let n = distances.len();
    let neighbourhoods: Vec<Vec<usize>> = distances
        .iter()
        .map(|row| (0..n).filter(|&j| row[j] <= eps).collect())
        .collect();
    let is_core: Vec<bool> = neighbourhoods
        .iter()
        .map(|nb| nb.len() >= min_samples)
        .collect();

    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut next_label = 0usize;

    for start in 0..n {
        if labels[start].is_some() || !is_core[start] {
            continue;
        }

        let mut stack = vec![start];
        while let Some(point) = stack.pop() {
            if labels[point].is_some() {
                continue;
            }
            labels[point] = Some(next_label);
            if is_core[point] {
                stack.extend(
                    neighbourhoods[point]
                        .iter()
                        .copied()
                        .filter(|&v| labels[v].is_none()),
                );
            }
        }

        next_label += 1;
    }

    labels
}

/// Mean correlation over ordered pairs `i != j` of `members`, ignoring NaN.
pub fn mean_internal_correlation(matrix: &[Vec<f64>], members: &[usize]) -> f64 {
    let values: Vec<f64> = members
        .iter()
        .flat_map(|&i| members.iter().filter(move |&&j| j != i).map(move |&j| matrix[i][j]))
        .filter(|v| v.is_finite())
        .collect();
    values.mean()
}

/// Strategy B: DBSCAN on `1 - correlation`
#[derive(Debug, Clone, Copy)]
pub struct DensityClustering {
    pub threshold: f64,
    pub min_samples: usize,
}

impl DensityClustering {
    pub fn new(threshold: f64, min_samples: usize) -> Self {
        Self {
            threshold,
            min_samples,
        }
    }

    pub fn eps(&self) -> f64 {
        1.0 - self.threshold
    }
}

impl Default for DensityClustering {
    fn default() -> Self {
        Self::new(super::DEFAULT_CORRELATION_THRESHOLD, 2)
    }
}

impl ClusteringStrategy for DensityClustering {
    fn name(&self) -> &'static str {
        "density"
    }

    fn group(&self, records: &DayRecords) -> Vec<GroupRow> {
        let entries: Vec<_> = records.iter().collect();
        let matrix = correlation_matrix(&numeric_vectors(records));
        let distances: Vec<Vec<f64>> = matrix
            .iter()
            .map(|row| row.iter().map(|r| 1.0 - r).collect())
            .collect();

        let labels = dbscan(&distances, self.eps(), self.min_samples);
        let cluster_count = labels.iter().flatten().fold(0, |count, &l| count.max(l + 1));

        let mut rows = Vec::new();
        for cluster in 0..cluster_count {
            let members: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, label)| **label == Some(cluster))
                .map(|(i, _)| i)
                .collect();
            let average = mean_internal_correlation(&matrix, &members);
            let label = format!("Group {}", cluster);

            for &i in &members {
                let (key, record) = entries[i];
                rows.push(GroupRow::new(label.clone(), average, key, record));
            }
        }

        log_grouping(self.name(), records.len(), &rows);
        rows
    }
}
