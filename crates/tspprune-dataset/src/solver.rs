//! Exact solving, used to label instances that ship without a reference tour.

use crate::error::{PipelineError, PipelineResult};
use crate::graph::Graph;

pub trait ExactSolver: Send + Sync {
    /// Indicator, in the graph's edge ordering, of every edge that lies on at
    /// least one optimal tour.
    fn optimal_edges(&self, graph: &Graph) -> PipelineResult<Vec<f64>>;
}

/// Hard ceiling on [`HeldKarpSolver`] instance size. The DP table holds
/// `2^(n-1) * (n-1)` entries, about 3 GiB at 24 nodes.
pub const MAX_EXACT_NODES: usize = 24;

/// Held-Karp dynamic program over node subsets, with a tie-aware backward
/// pass that collects the edges of all optimal tours.
///
/// Time `O(2^n n^2)`, memory `O(2^n n)`; instances above `max_nodes` (never
/// more than [`MAX_EXACT_NODES`]) are refused with [`PipelineError::Solver`].
#[derive(Debug, Clone, Copy)]
pub struct HeldKarpSolver {
    max_nodes: usize,
}

impl HeldKarpSolver {
    #[must_use]
    pub fn new(max_nodes: usize) -> Self {
        Self { max_nodes }
    }
}

impl ExactSolver for HeldKarpSolver {
    fn optimal_edges(&self, graph: &Graph) -> PipelineResult<Vec<f64>> {
        let n = graph.order();
        let limit = self.max_nodes.min(MAX_EXACT_NODES);
        if n > limit {
            return Err(PipelineError::Solver(format!(
                "{} has {n} nodes, exact solving is limited to {limit}",
                graph.name()
            )));
        }
        // every edge of the only possible tour
        if n <= 3 {
            return Ok(vec![1.0; graph.edge_count()]);
        }
        Ok(held_karp(graph))
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

fn held_karp(graph: &Graph) -> Vec<f64> {
    let n = graph.order();
    // node 0 is the fixed start; nodes 1..n are bits 0..m
    let m = n - 1;
    let full = (1usize << m) - 1;
    let at = |mask: usize, j: usize| mask * m + j;
    let w = |a: usize, b: usize| graph.weight(a, b);

    let mut dp = vec![f64::INFINITY; (1 << m) * m];
    for j in 0..m {
        dp[at(1 << j, j)] = w(0, j + 1);
    }
    for mask in 1..=full {
        for j in 0..m {
            if mask & (1 << j) == 0 {
                continue;
            }
            let cost = dp[at(mask, j)];
            if !cost.is_finite() {
                continue;
            }
            for k in 0..m {
                if mask & (1 << k) != 0 {
                    continue;
                }
                let next = at(mask | (1 << k), k);
                let candidate = cost + w(j + 1, k + 1);
                if candidate < dp[next] {
                    dp[next] = candidate;
                }
            }
        }
    }

    let optimum = (0..m).map(|j| dp[at(full, j)] + w(j + 1, 0)).fold(f64::INFINITY, f64::min);

    let ordering = graph.ordering();
    let mut on_optimal = vec![0.0; graph.edge_count()];
    let mut visited = vec![false; dp.len()];
    let mut stack = Vec::new();

    for j in 0..m {
        if close(dp[at(full, j)] + w(j + 1, 0), optimum) {
            on_optimal[ordering.local_index(0, j + 1)] = 1.0;
            visited[at(full, j)] = true;
            stack.push((full, j));
        }
    }

    while let Some((mask, j)) = stack.pop() {
        let prev = mask & !(1 << j);
        if prev == 0 {
            on_optimal[ordering.local_index(0, j + 1)] = 1.0;
            continue;
        }
        for k in 0..m {
            if prev & (1 << k) == 0 {
                continue;
            }
            if close(dp[at(prev, k)] + w(k + 1, j + 1), dp[at(mask, j)]) {
                on_optimal[ordering.local_index(k + 1, j + 1)] = 1.0;
                if !std::mem::replace(&mut visited[at(prev, k)], true) {
                    stack.push((prev, k));
                }
            }
        }
    }

    on_optimal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Tour;

    fn euclidean(coords: &[(f64, f64)]) -> Graph {
        Graph::from_fn("g", coords.len(), 1, |a, b| {
            let (p, q) = (coords[a], coords[b]);
            (p.0 - q.0).hypot(p.1 - q.1).round()
        })
        .unwrap()
    }

    #[test]
    fn test_unique_optimum_on_rectangle() {
        let graph = euclidean(&[(0.0, 0.0), (30.0, 0.0), (30.0, 10.0), (0.0, 10.0)]);
        let edges = HeldKarpSolver::new(16).optimal_edges(&graph).unwrap();

        let expected = Tour::new(vec![1, 2, 3, 4]).indicator(&graph.ordering()).unwrap();
        assert_eq!(edges, expected);
    }

    #[test]
    fn test_ties_union_all_optimal_tours() {
        // every Hamiltonian cycle of K4 with unit weights is optimal
        let graph = Graph::from_fn("k4", 4, 1, |_, _| 1.0).unwrap();
        let edges = HeldKarpSolver::new(16).optimal_edges(&graph).unwrap();
        assert_eq!(edges, vec![1.0; 6]);
    }

    #[test]
    fn test_matches_brute_force_on_small_instance() {
        let coords = [(0.0, 0.0), (7.0, 1.0), (3.0, 9.0), (12.0, 4.0), (5.0, 5.0), (1.0, 6.0)];
        let graph = euclidean(&coords);
        let edges = HeldKarpSolver::new(16).optimal_edges(&graph).unwrap();

        // brute force over permutations fixing node 1 first
        let ordering = graph.ordering();
        let mut best = f64::INFINITY;
        let mut union = vec![0.0; graph.edge_count()];
        let mut perm: Vec<usize> = (1..coords.len()).collect();
        permute(&mut perm, 0, &mut |p| {
            let mut tour = vec![0];
            tour.extend_from_slice(p);
            let cost: f64 =
                (0..tour.len()).map(|i| graph.weight(tour[i], tour[(i + 1) % tour.len()])).sum();
            if cost < best - 1e-9 {
                best = cost;
                union = vec![0.0; graph.edge_count()];
            }
            if (cost - best).abs() <= 1e-9 {
                for i in 0..tour.len() {
                    union[ordering.local_index(tour[i], tour[(i + 1) % tour.len()])] = 1.0;
                }
            }
        });

        assert_eq!(edges, union);
    }

    fn permute(items: &mut [usize], k: usize, visit: &mut impl FnMut(&[usize])) {
        if k == items.len() {
            visit(items);
            return;
        }
        for i in k..items.len() {
            items.swap(k, i);
            permute(items, k + 1, visit);
            items.swap(k, i);
        }
    }

    #[test]
    fn test_refuses_large_instances() {
        let graph = Graph::from_fn("big", 6, 1, |_, _| 1.0).unwrap();
        let refused = HeldKarpSolver::new(5).optimal_edges(&graph);
        assert!(matches!(refused, Err(PipelineError::Solver(_))));
    }

    #[test]
    fn test_limit_never_exceeds_hard_ceiling() {
        let graph = Graph::from_fn("huge", 66, 1, |_, _| 1.0).unwrap();
        let err = HeldKarpSolver::new(200).optimal_edges(&graph).unwrap_err();
        assert!(matches!(err, PipelineError::Solver(msg) if msg.contains("limited to 24")));
    }

    #[test]
    fn test_triangle_uses_every_edge() {
        let graph = Graph::from_fn("tri", 3, 1, |a, b| (a + b) as f64).unwrap();
        assert_eq!(HeldKarpSolver::new(16).optimal_edges(&graph).unwrap(), vec![1.0; 3]);
    }
}
