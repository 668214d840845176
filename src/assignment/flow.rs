//! Flow definitions
//! - LinkFlow: total flow on each link
//! - OdLinkFlow: flow on each link attributable to each OD pair
//!
//! Both are dense and addressed by `EdgeIndex` (and `OdIndex`), so the hot loop never hashes.
use super::network::OdIndex;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef; // for EdgeReference.id()
use petgraph::Direction;
use std::ops::{Index, IndexMut};

/// flows below this are regarded as zero in the conservation checks
pub const FLOW_EPS: f64 = 1e-9;

/// Convex combination `alpha * auxiliary + (1 - alpha) * current`
#[inline]
pub fn interpolate(alpha: f64, auxiliary: f64, current: f64) -> f64 {
    alpha * auxiliary + (1.0 - alpha) * current
}

/// Flow definitions
///
/// LinkFlow x is a mapping of f64 x(e) to each edge e
#[derive(PartialEq, Debug, Clone, Default)]
pub struct LinkFlow(Vec<f64>);

impl LinkFlow {
    pub fn zero(n_links: usize) -> LinkFlow {
        LinkFlow(vec![0.0; n_links])
    }
    pub fn from_vec(vec: Vec<f64>) -> LinkFlow {
        LinkFlow(vec)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn add(&mut self, e: EdgeIndex, v: f64) {
        self.0[e.index()] += v;
    }
    /// grow to `n_links` entries, new links carry zero flow
    pub fn resize(&mut self, n_links: usize) {
        self.0.resize(n_links, 0.0);
    }
    pub fn iter(&self) -> impl Iterator<Item = (EdgeIndex, f64)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(i, &f)| (EdgeIndex::new(i), f))
    }
}

impl Index<EdgeIndex> for LinkFlow {
    type Output = f64;
    fn index(&self, e: EdgeIndex) -> &f64 {
        &self.0[e.index()]
    }
}

impl IndexMut<EdgeIndex> for LinkFlow {
    fn index_mut(&mut self, e: EdgeIndex) -> &mut f64 {
        &mut self.0[e.index()]
    }
}

///
/// Per-OD link flow, a dense `n_links x n_ods` matrix stored row-major by link.
///
/// Rows are `stride >= n_ods` wide and the padding stays zero, so adding OD pairs one by one
/// only rebuilds the matrix when the stride doubles.
///
#[derive(Debug, Clone, Default)]
pub struct OdLinkFlow {
    n_links: usize,
    n_ods: usize,
    stride: usize,
    data: Vec<f64>,
}

impl OdLinkFlow {
    pub fn zero(n_links: usize, n_ods: usize) -> OdLinkFlow {
        OdLinkFlow {
            n_links,
            n_ods,
            stride: n_ods,
            data: vec![0.0; n_links * n_ods],
        }
    }
    #[inline]
    fn offset(&self, e: EdgeIndex, od: OdIndex) -> usize {
        debug_assert!(od < self.n_ods);
        e.index() * self.stride + od
    }
    pub fn get(&self, e: EdgeIndex, od: OdIndex) -> f64 {
        self.data[self.offset(e, od)]
    }
    pub fn set(&mut self, e: EdgeIndex, od: OdIndex, v: f64) {
        let i = self.offset(e, od);
        self.data[i] = v;
    }
    pub fn add(&mut self, e: EdgeIndex, od: OdIndex, v: f64) {
        let i = self.offset(e, od);
        self.data[i] += v;
    }
    /// flows of every OD pair on link `e`
    pub fn row(&self, e: EdgeIndex) -> &[f64] {
        let start = e.index() * self.stride;
        &self.data[start..start + self.n_ods]
    }
    pub fn row_mut(&mut self, e: EdgeIndex) -> &mut [f64] {
        let start = e.index() * self.stride;
        &mut self.data[start..start + self.n_ods]
    }
    /// sum over OD pairs, i.e. the aggregate link flow this matrix implies
    pub fn link_total(&self, e: EdgeIndex) -> f64 {
        self.row(e).iter().sum()
    }
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }
    ///
    /// Reshape to `n_links x n_ods` keeping every existing entry.
    /// New links and new OD pairs start at zero.
    ///
    /// Growing past the stride at least doubles it, so a sequence of single-OD growths costs
    /// amortized `O(n_links)` each.
    ///
    pub fn resize(&mut self, n_links: usize, n_ods: usize) {
        if n_links == self.n_links && n_ods == self.n_ods {
            return;
        }
        if n_ods > self.stride {
            let stride = n_ods.max(2 * self.stride);
            let mut data = vec![0.0; n_links * stride];
            for link in 0..self.n_links.min(n_links) {
                let old = link * self.stride;
                data[link * stride..link * stride + self.n_ods]
                    .copy_from_slice(&self.data[old..old + self.n_ods]);
            }
            self.stride = stride;
            self.data = data;
        } else {
            // dropped OD pairs must not reappear when the matrix grows again
            if n_ods < self.n_ods {
                for link in 0..self.n_links.min(n_links) {
                    let start = link * self.stride;
                    self.data[start + n_ods..start + self.n_ods].fill(0.0);
                }
            }
            self.data.resize(n_links * self.stride, 0.0);
        }
        self.n_links = n_links;
        self.n_ods = n_ods;
    }
}

impl PartialEq for OdLinkFlow {
    /// same shape and entries; the stride is storage detail
    fn eq(&self, other: &Self) -> bool {
        self.n_links == other.n_links
            && self.n_ods == other.n_ods
            && (0..self.n_links).all(|i| {
                let e = EdgeIndex::new(i);
                self.row(e) == other.row(e)
            })
    }
}

///
/// For each link, the total flow must be equal to the sum of its per-OD flows.
///
pub fn is_link_flow_consistent(flow: &LinkFlow, od_flow: &OdLinkFlow, eps: f64) -> bool {
    flow.iter()
        .all(|(e, f)| f >= -eps && (f - od_flow.link_total(e)).abs() <= eps)
}

///
/// For each node other than the origin and destination of `od`,
/// (the sum of in-coming flows of `od`) should be equal to (the sum of out-going flows of `od`).
///
pub fn is_conserving_od_flow<N, E>(
    graph: &DiGraph<N, E>,
    od_flow: &OdLinkFlow,
    od: OdIndex,
    origin: NodeIndex,
    destination: NodeIndex,
    eps: f64,
) -> bool {
    graph
        .node_indices()
        .filter(|&v| v != origin && v != destination)
        .all(|v| {
            let in_flow: f64 = graph
                .edges_directed(v, Direction::Incoming)
                .map(|er| od_flow.get(er.id(), od))
                .sum();
            let out_flow: f64 = graph
                .edges_directed(v, Direction::Outgoing)
                .map(|er| od_flow.get(er.id(), od))
                .sum();
            (in_flow - out_flow).abs() <= eps
        })
}

//
// tests
//
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolate_endpoints() {
        assert_eq!(interpolate(0.0, 7.0, 3.0), 3.0);
        assert_eq!(interpolate(1.0, 7.0, 3.0), 7.0);
        assert!((interpolate(0.25, 7.0, 3.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn od_link_flow_resize_keeps_entries() {
        let mut m = OdLinkFlow::zero(2, 1);
        m.set(EdgeIndex::new(0), 0, 1.5);
        m.set(EdgeIndex::new(1), 0, 2.5);
        m.resize(3, 2);
        assert_eq!(m.get(EdgeIndex::new(0), 0), 1.5);
        assert_eq!(m.get(EdgeIndex::new(1), 0), 2.5);
        assert_eq!(m.get(EdgeIndex::new(1), 1), 0.0);
        assert_eq!(m.get(EdgeIndex::new(2), 1), 0.0);
        assert_eq!(m.link_total(EdgeIndex::new(1)), 2.5);
    }

    #[test]
    fn od_link_flow_grows_one_od_at_a_time() {
        let n_links = 50;
        let mut m = OdLinkFlow::zero(n_links, 0);
        for n_ods in 1..=300 {
            m.resize(n_links, n_ods);
            let od = n_ods - 1;
            for i in 0..n_links {
                m.set(EdgeIndex::new(i), od, (i * 1000 + od) as f64);
            }
        }
        for i in 0..n_links {
            let e = EdgeIndex::new(i);
            assert_eq!(m.row(e).len(), 300);
            assert_eq!(m.get(e, 0), (i * 1000) as f64);
            assert_eq!(m.get(e, 299), (i * 1000 + 299) as f64);
        }

        // shrinking drops the removed OD pairs for good
        m.resize(n_links, 10);
        m.resize(n_links, 20);
        assert_eq!(m.get(EdgeIndex::new(3), 9), 3009.0);
        assert_eq!(m.get(EdgeIndex::new(3), 15), 0.0);

        // equality ignores how the rows are padded
        let mut fresh = OdLinkFlow::zero(n_links, 20);
        for i in 0..n_links {
            for od in 0..10 {
                fresh.set(EdgeIndex::new(i), od, (i * 1000 + od) as f64);
            }
        }
        assert_eq!(m, fresh);
    }

    #[test]
    fn flow_consistency_tests() {
        let mut od = OdLinkFlow::zero(2, 2);
        od.set(EdgeIndex::new(0), 0, 1.0);
        od.set(EdgeIndex::new(0), 1, 2.0);
        od.set(EdgeIndex::new(1), 1, 4.0);

        // this flow matches the per-OD breakdown
        let f1 = LinkFlow::from_vec(vec![3.0, 4.0]);
        assert!(is_link_flow_consistent(&f1, &od, 1e-9));

        // this flow lost the contribution of the first OD on link 0
        let f2 = LinkFlow::from_vec(vec![2.0, 4.0]);
        assert!(!is_link_flow_consistent(&f2, &od, 1e-9));
    }

    #[test]
    fn conservation_on_a_chain() {
        let mut g: DiGraph<(), ()> = DiGraph::new();
        let a = g.add_node(());
        let b = g.add_node(());
        let c = g.add_node(());
        let e0 = g.add_edge(a, b, ());
        let e1 = g.add_edge(b, c, ());

        let mut od = OdLinkFlow::zero(2, 1);
        od.set(e0, 0, 5.0);
        od.set(e1, 0, 5.0);
        assert!(is_conserving_od_flow(&g, &od, 0, a, c, 1e-9));

        // flow disappears at b
        od.set(e1, 0, 1.0);
        assert!(!is_conserving_od_flow(&g, &od, 0, a, c, 1e-9));
    }
}
