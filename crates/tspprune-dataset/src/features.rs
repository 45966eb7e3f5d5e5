//! Per-edge feature functions.
//!
//! Every feature maps a [`Graph`] to one score per edge, in the graph's
//! [`EdgeOrdering`](crate::graph::EdgeOrdering). Names are resolved once,
//! up front, against a [`FeatureRegistry`]; an unrecognised name fails with
//! [`PipelineError::UnknownFeature`] before any instance is touched.

use crate::config::validate_feature_name;
use crate::error::{PipelineError, PipelineResult};
use crate::graph::Graph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub trait EdgeFeature: Send + Sync {
    fn name(&self) -> &str;

    fn compute(&self, graph: &Graph) -> PipelineResult<Vec<f64>>;
}

/// How `iterated_mst` scores an edge first picked in round `i` of `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MstWeighting {
    /// `1 / i`
    #[default]
    Reciprocal,
    /// `(k - i + 1) / k`
    Linear,
}

impl MstWeighting {
    fn score(self, round: usize, rounds: usize) -> f64 {
        match self {
            Self::Reciprocal => 1.0 / round as f64,
            Self::Linear => (rounds - round + 1) as f64 / rounds as f64,
        }
    }
}

/// Parameters passed explicitly into feature computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureParams {
    #[serde(default = "default_mst_rounds")]
    pub mst_rounds: usize,
    #[serde(default)]
    pub mst_weighting: MstWeighting,
}

fn default_mst_rounds() -> usize {
    5
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self { mst_rounds: default_mst_rounds(), mst_weighting: MstWeighting::default() }
    }
}

impl FeatureParams {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.mst_rounds == 0 {
            return Err(PipelineError::InvalidConfig(
                "feature_params.mst_rounds must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The built-in feature functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Edge weight over the instance's maximum edge weight.
    Weight,
    /// Mean of the edge's rank among each endpoint's neighbours, scaled to `[0, 1]`.
    NeighbourRank,
    /// Mean of both endpoints' cheapest incident weight over the edge weight.
    MinRatio,
    /// Membership in a minimum spanning tree.
    Mst,
    /// Round in which the edge joins one of `mst_rounds` successive disjoint
    /// minimum spanning forests, scored by [`MstWeighting`].
    IteratedMst,
}

impl FeatureKind {
    pub const ALL: [Self; 5] =
        [Self::Weight, Self::NeighbourRank, Self::MinRatio, Self::Mst, Self::IteratedMst];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Weight => "weight",
            Self::NeighbourRank => "neighbour_rank",
            Self::MinRatio => "min_ratio",
            Self::Mst => "mst",
            Self::IteratedMst => "iterated_mst",
        }
    }

    #[must_use]
    pub fn compute(self, graph: &Graph, params: &FeatureParams) -> Vec<f64> {
        match self {
            Self::Weight => weight(graph),
            Self::NeighbourRank => neighbour_rank(graph),
            Self::MinRatio => min_ratio(graph),
            Self::Mst => spanning_forest_rounds(graph, 1)
                .into_iter()
                .map(|round| if round == 1 { 1.0 } else { 0.0 })
                .collect(),
            Self::IteratedMst => spanning_forest_rounds(graph, params.mst_rounds)
                .into_iter()
                .map(|round| match round {
                    0 => 0.0,
                    _ => params.mst_weighting.score(round, params.mst_rounds),
                })
                .collect(),
        }
    }
}

/// A [`FeatureKind`] bound to its parameters.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinFeature {
    kind: FeatureKind,
    params: FeatureParams,
}

impl BuiltinFeature {
    #[must_use]
    pub fn new(kind: FeatureKind, params: FeatureParams) -> Self {
        Self { kind, params }
    }
}

impl EdgeFeature for BuiltinFeature {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn compute(&self, graph: &Graph) -> PipelineResult<Vec<f64>> {
        Ok(self.kind.compute(graph, &self.params))
    }
}

/// Static name → feature mapping.
#[derive(Clone, Default)]
pub struct FeatureRegistry {
    entries: BTreeMap<String, Arc<dyn EdgeFeature>>,
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FeatureRegistry {
    /// Registry holding every [`FeatureKind`] with `params`.
    #[must_use]
    pub fn builtin(params: FeatureParams) -> Self {
        let entries = FeatureKind::ALL
            .into_iter()
            .map(|kind| {
                let feature: Arc<dyn EdgeFeature> = Arc::new(BuiltinFeature::new(kind, params));
                (kind.name().to_string(), feature)
            })
            .collect();
        Self { entries }
    }

    /// Add or replace a feature under its own name.
    pub fn register(&mut self, feature: Arc<dyn EdgeFeature>) -> PipelineResult<()> {
        validate_feature_name(feature.name())?;
        self.entries.insert(feature.name().to_string(), feature);
        Ok(())
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Look up `names` in order.
    pub fn resolve(&self, names: &[String]) -> PipelineResult<Vec<Arc<dyn EdgeFeature>>> {
        names
            .iter()
            .map(|name| {
                self.entries
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PipelineError::UnknownFeature(name.clone()))
            })
            .collect()
    }
}

fn weight(graph: &Graph) -> Vec<f64> {
    let max = graph.max_weight().unwrap_or(0.0);
    graph.weights().iter().map(|w| if max > 0.0 { w / max } else { 0.0 }).collect()
}

/// `rank[a][b]`: position of `b` among `a`'s neighbours sorted by weight
/// (ties by index).
fn neighbour_ranks(graph: &Graph) -> Vec<Vec<usize>> {
    let n = graph.order();
    (0..n)
        .map(|a| {
            let mut neighbours: Vec<usize> = (0..n).filter(|&b| b != a).collect();
            neighbours.sort_by(|&x, &y| {
                graph.weight(a, x).total_cmp(&graph.weight(a, y)).then(x.cmp(&y))
            });
            let mut rank = vec![0; n];
            for (position, b) in neighbours.into_iter().enumerate() {
                rank[b] = position;
            }
            rank
        })
        .collect()
}

fn neighbour_rank(graph: &Graph) -> Vec<f64> {
    let n = graph.order();
    if n <= 2 {
        return vec![0.0; graph.edge_count()];
    }
    let rank = neighbour_ranks(graph);
    let scale = 2.0 * (n - 2) as f64;
    graph
        .ordering()
        .edges()
        .map(|(a, b)| (rank[a][b] + rank[b][a]) as f64 / scale)
        .collect()
}

fn min_ratio(graph: &Graph) -> Vec<f64> {
    let n = graph.order();
    let cheapest: Vec<f64> = (0..n)
        .map(|a| {
            (0..n).filter(|&b| b != a).map(|b| graph.weight(a, b)).fold(f64::INFINITY, f64::min)
        })
        .collect();
    graph
        .ordering()
        .edges()
        .map(|(a, b)| {
            let w = graph.weight(a, b);
            if w > 0.0 { (cheapest[a] + cheapest[b]) / (2.0 * w) } else { 1.0 }
        })
        .collect()
}

/// Kruskal over edges not yet taken, `rounds` times. Entry `i` is the
/// 1-based round edge `i` was taken in, or 0.
fn spanning_forest_rounds(graph: &Graph, rounds: usize) -> Vec<usize> {
    let mut by_weight: Vec<usize> = (0..graph.edge_count()).collect();
    by_weight.sort_by(|&x, &y| graph.weights()[x].total_cmp(&graph.weights()[y]).then(x.cmp(&y)));

    let ordering = graph.ordering();
    let mut taken = vec![0; graph.edge_count()];
    for round in 1..=rounds {
        let mut forest = UnionFind::new(graph.order());
        for &edge in &by_weight {
            if taken[edge] != 0 {
                continue;
            }
            let (a, b) = ordering.endpoints(edge);
            if forest.union(a, b) {
                taken[edge] = round;
            }
        }
    }
    taken
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        self.parent[ra] = rb;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeOrdering;

    fn square() -> Graph {
        // 1-2-3-4 unit square, diagonals sqrt(2)
        let coords = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        Graph::from_fn("square", 4, 1, |a, b| {
            let (p, q): ((f64, f64), (f64, f64)) = (coords[a], coords[b]);
            (p.0 - q.0).hypot(p.1 - q.1)
        })
        .unwrap()
    }

    #[test]
    fn test_unknown_feature_fails_fast() {
        let registry = FeatureRegistry::builtin(FeatureParams::default());
        let err = registry.resolve(&["weight".to_string(), "fz".to_string()]).err().unwrap();
        assert!(matches!(err, PipelineError::UnknownFeature(name) if name == "fz"));
    }

    #[test]
    fn test_resolve_preserves_requested_order() {
        let registry = FeatureRegistry::builtin(FeatureParams::default());
        let names = vec!["mst".to_string(), "weight".to_string()];
        let resolved = registry.resolve(&names).unwrap();
        assert_eq!(resolved.iter().map(|f| f.name()).collect::<Vec<_>>(), vec!["mst", "weight"]);
    }

    #[test]
    fn test_weight_is_max_normalised() {
        let graph = Graph::new("g", EdgeOrdering::new(3, 1), vec![2.0, 4.0, 8.0]).unwrap();
        let weights = FeatureKind::Weight.compute(&graph, &FeatureParams::default());
        assert_eq!(weights, vec![0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_mst_picks_n_minus_one_edges() {
        let graph = square();
        let mst = FeatureKind::Mst.compute(&graph, &FeatureParams::default());
        assert_eq!(mst.iter().sum::<f64>(), 3.0);
        let ordering = graph.ordering();
        // diagonals are never in the MST of a square
        assert_eq!(mst[ordering.local_index(0, 2)], 0.0);
        assert_eq!(mst[ordering.local_index(1, 3)], 0.0);
    }

    #[test]
    fn test_iterated_mst_weighting_schemes() {
        let graph = square();
        let reciprocal = FeatureParams { mst_rounds: 2, mst_weighting: MstWeighting::Reciprocal };
        let linear = FeatureParams { mst_rounds: 2, mst_weighting: MstWeighting::Linear };

        let r = FeatureKind::IteratedMst.compute(&graph, &reciprocal);
        let l = FeatureKind::IteratedMst.compute(&graph, &linear);

        // round 1 takes 3 sides, round 2 the remaining side and both diagonals
        assert_eq!(r.iter().filter(|&&v| v == 1.0).count(), 3);
        assert_eq!(r.iter().filter(|&&v| v == 0.5).count(), 3);
        assert_eq!(l.iter().filter(|&&v| v == 1.0).count(), 3);
        assert_eq!(l.iter().filter(|&&v| v == 0.5).count(), 3);
    }

    #[test]
    fn test_neighbour_rank_is_symmetric_and_bounded() {
        let graph = square();
        let ranks = FeatureKind::NeighbourRank.compute(&graph, &FeatureParams::default());
        assert!(ranks.iter().all(|&r| (0.0..=1.0).contains(&r)));
        let ordering = graph.ordering();
        // the diagonal is every node's farthest neighbour
        assert_eq!(ranks[ordering.local_index(0, 2)], 1.0);
    }

    #[test]
    fn test_min_ratio_is_one_for_cheapest_edges() {
        let graph = square();
        let ratios = FeatureKind::MinRatio.compute(&graph, &FeatureParams::default());
        assert!((ratios[graph.ordering().local_index(0, 1)] - 1.0).abs() < 1e-12);
        assert!(ratios[graph.ordering().local_index(0, 2)] < 1.0);
    }

    #[test]
    fn test_register_rejects_reserved_names() {
        struct Named(&'static str);
        impl EdgeFeature for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn compute(&self, graph: &Graph) -> PipelineResult<Vec<f64>> {
                Ok(vec![0.0; graph.edge_count()])
            }
        }

        let mut registry = FeatureRegistry::default();
        assert!(registry.register(Arc::new(Named("sample_weights"))).is_err());
        registry.register(Arc::new(Named("custom"))).unwrap();
        assert_eq!(registry.names(), vec!["custom"]);
    }
}
