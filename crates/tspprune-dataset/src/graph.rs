//! Complete undirected weighted graphs and the edge ordering every artifact
//! array of an instance is indexed by.

use crate::error::{PipelineError, PipelineResult};
use std::path::PathBuf;

/// Deterministic enumeration of the unordered edges of a complete graph on
/// `order` nodes with contiguous ids starting at `min_node`.
///
/// Edge `{u, v}` with local indexes `a < b` maps to
/// `a * order - a * (a + 1) / 2 + (b - a - 1)`, a bijection onto `[0, E)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeOrdering {
    order: usize,
    min_node: u32,
}

impl EdgeOrdering {
    #[must_use]
    pub fn new(order: usize, min_node: u32) -> Self {
        Self { order, min_node }
    }

    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    #[must_use]
    pub fn min_node(&self) -> u32 {
        self.min_node
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.order * self.order.saturating_sub(1) / 2
    }

    /// Index of the edge between node ids `u` and `v`, in either order.
    pub fn index(&self, u: u32, v: u32) -> PipelineResult<usize> {
        let a = self.local(u)?;
        let b = self.local(v)?;
        if a == b {
            return Err(PipelineError::invalid_instance(
                PathBuf::new(),
                format!("self-loop on node {u} has no edge index"),
            ));
        }
        Ok(self.local_index(a, b))
    }

    /// Index from local (zero-based) node indexes. `a != b`, both `< order`.
    #[must_use]
    pub fn local_index(&self, a: usize, b: usize) -> usize {
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        a * self.order - a * (a + 1) / 2 + (b - a - 1)
    }

    /// Local endpoints `(a, b)` with `a < b` of edge `index`.
    #[must_use]
    pub fn endpoints(&self, index: usize) -> (usize, usize) {
        let mut a = 0;
        let mut row_start = 0;
        loop {
            let row_len = self.order - a - 1;
            if index < row_start + row_len {
                return (a, a + 1 + index - row_start);
            }
            row_start += row_len;
            a += 1;
        }
    }

    /// All edges as local `(a, b)` pairs, in index order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + use<> {
        let order = self.order;
        (0..order).flat_map(move |a| (a + 1..order).map(move |b| (a, b)))
    }

    fn local(&self, node: u32) -> PipelineResult<usize> {
        let local = node
            .checked_sub(self.min_node)
            .map(|d| d as usize)
            .filter(|&d| d < self.order)
            .ok_or_else(|| {
                PipelineError::invalid_instance(
                    PathBuf::new(),
                    format!(
                        "node {node} outside {}..={}",
                        self.min_node,
                        self.min_node as usize + self.order.saturating_sub(1)
                    ),
                )
            })?;
        Ok(local)
    }
}

/// A problem instance's complete weighted graph, weights stored in
/// [`EdgeOrdering`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    name: String,
    ordering: EdgeOrdering,
    weights: Vec<f64>,
}

impl Graph {
    pub fn new(
        name: impl Into<String>,
        ordering: EdgeOrdering,
        weights: Vec<f64>,
    ) -> PipelineResult<Self> {
        let name = name.into();
        if weights.len() != ordering.edge_count() {
            return Err(PipelineError::invalid_instance(
                PathBuf::from(&name),
                format!("expected {} edge weights, got {}", ordering.edge_count(), weights.len()),
            ));
        }
        Ok(Self { name, ordering, weights })
    }

    /// Build from a symmetric weight function over local indexes.
    pub fn from_fn(
        name: impl Into<String>,
        order: usize,
        min_node: u32,
        mut weight: impl FnMut(usize, usize) -> f64,
    ) -> PipelineResult<Self> {
        let ordering = EdgeOrdering::new(order, min_node);
        let weights = ordering.edges().map(|(a, b)| weight(a, b)).collect();
        Self::new(name, ordering, weights)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ordering(&self) -> EdgeOrdering {
        self.ordering
    }

    #[must_use]
    pub fn order(&self) -> usize {
        self.ordering.order
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.weights.len()
    }

    /// Edge weights in index order.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Weight between local nodes `a != b`.
    #[must_use]
    pub fn weight(&self, a: usize, b: usize) -> f64 {
        self.weights[self.ordering.local_index(a, b)]
    }

    #[must_use]
    pub fn max_weight(&self) -> Option<f64> {
        self.weights.iter().copied().reduce(f64::max)
    }
}

/// A closed tour as an ordered sequence of node ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tour {
    nodes: Vec<u32>,
}

impl Tour {
    #[must_use]
    pub fn new(nodes: Vec<u32>) -> Self {
        Self { nodes }
    }

    #[must_use]
    pub fn nodes(&self) -> &[u32] {
        &self.nodes
    }

    /// Consecutive pairs plus the closing edge back to the first node.
    pub fn edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let n = self.nodes.len();
        let closing = if n > 1 { n } else { 0 };
        (0..closing).map(move |i| (self.nodes[i], self.nodes[(i + 1) % n]))
    }

    /// Binary indicator over `ordering` of the edges this tour uses.
    pub fn indicator(&self, ordering: &EdgeOrdering) -> PipelineResult<Vec<f64>> {
        self.validate(ordering)?;
        let mut out = vec![0.0; ordering.edge_count()];
        for (u, v) in self.edges() {
            out[ordering.index(u, v)?] = 1.0;
        }
        Ok(out)
    }

    fn validate(&self, ordering: &EdgeOrdering) -> PipelineResult<()> {
        if self.nodes.len() != ordering.order() {
            return Err(PipelineError::invalid_instance(
                PathBuf::new(),
                format!(
                    "tour visits {} nodes, instance has {}",
                    self.nodes.len(),
                    ordering.order()
                ),
            ));
        }
        let mut seen = vec![false; ordering.order()];
        for &node in &self.nodes {
            let local = ordering.local(node)?;
            if std::mem::replace(&mut seen[local], true) {
                return Err(PipelineError::invalid_instance(
                    PathBuf::new(),
                    format!("tour visits node {node} twice"),
                ));
            }
        }
        Ok(())
    }
}
