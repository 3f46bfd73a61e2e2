//! Pareto dominance, the non-dominated front, and crowding distance
//!
//! # References
//!
//! \[1\] Deb et al. (2002) - A Fast and Elitist Multiobjective Genetic Algorithm (NSGA-II)

use serde::{Deserialize, Serialize};

use crate::trial::Direction;

/// Whether `a` dominates `b`: at least as good on every objective and
/// strictly better on at least one, per the given directions.
pub fn dominates(a: &[f64], b: &[f64], directions: &[Direction]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), directions.len());

    let mut strictly_better = false;
    for ((&va, &vb), dir) in a.iter().zip(b.iter()).zip(directions.iter()) {
        if !dir.is_at_least(va, vb) {
            return false;
        }
        if dir.is_better(va, vb) {
            strictly_better = true;
        }
    }
    strictly_better
}

/// One front member: a completed trial and its objective vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontMember {
    pub trial_id: u64,
    pub values: Vec<f64>,
}

/// The set of non-dominated completed trials, maintained incrementally.
///
/// Crowding distance ranks members for trimming when the front outgrows
/// `max_size`; it never decides membership. A non-dominated point is only
/// ever displaced for diversity, not by a domination argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParetoFront {
    directions: Vec<Direction>,
    members: Vec<FrontMember>,
    /// Trim threshold; `None` = unbounded
    max_size: Option<usize>,
}

impl ParetoFront {
    /// Create an empty front for the given objective directions
    pub fn new(directions: Vec<Direction>) -> Self {
        Self { directions, members: Vec::new(), max_size: None }
    }

    /// Bound the front size; over-large fronts are trimmed by crowding rank
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size.max(2));
        self
    }

    /// Current members
    pub fn members(&self) -> &[FrontMember] {
        &self.members
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the front is empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Offer a newly completed trial. Removes any members the newcomer
    /// dominates, then inserts it unless an existing member dominates it.
    /// Returns true if the trial joined the front.
    pub fn offer(&mut self, trial_id: u64, values: Vec<f64>) -> bool {
        if values.len() != self.directions.len() || values.iter().any(|v| !v.is_finite()) {
            return false;
        }
        if self
            .members
            .iter()
            .any(|m| dominates(&m.values, &values, &self.directions))
        {
            return false;
        }
        self.members
            .retain(|m| !dominates(&values, &m.values, &self.directions));
        self.members.push(FrontMember { trial_id, values });

        if let Some(max) = self.max_size {
            if self.members.len() > max {
                self.trim(max);
            }
        }
        true
    }

    /// Crowding distance per member: the sum over objectives of normalized
    /// gaps to the two nearest neighbors; boundary members are infinite so
    /// extremes always survive trimming.
    pub fn crowding_distances(&self) -> Vec<f64> {
        let n = self.members.len();
        let mut distances = vec![0.0; n];
        if n <= 2 {
            return vec![f64::INFINITY; n];
        }

        for (obj, _) in self.directions.iter().enumerate() {
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| {
                self.members[a].values[obj]
                    .partial_cmp(&self.members[b].values[obj])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let lo = self.members[order[0]].values[obj];
            let hi = self.members[order[n - 1]].values[obj];
            let span = hi - lo;

            distances[order[0]] = f64::INFINITY;
            distances[order[n - 1]] = f64::INFINITY;
            if span <= 0.0 {
                continue;
            }
            for w in 1..n - 1 {
                let prev = self.members[order[w - 1]].values[obj];
                let next = self.members[order[w + 1]].values[obj];
                distances[order[w]] += (next - prev) / span;
            }
        }
        distances
    }

    /// Keep the `keep` most-crowded-out members (largest crowding distance)
    fn trim(&mut self, keep: usize) {
        let distances = self.crowding_distances();
        let mut order: Vec<usize> = (0..self.members.len()).collect();
        order.sort_by(|&a, &b| {
            distances[b]
                .partial_cmp(&distances[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let kept: Vec<FrontMember> = order
            .into_iter()
            .take(keep)
            .map(|i| self.members[i].clone())
            .collect();
        self.members = kept;
    }
}
