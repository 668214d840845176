//! Shortest paths and all-or-nothing loading
//! - ShortestPathTree: labels and predecessor links of one origin
//! - dijkstra: label-setting search on the current link costs
//! - load_aon: auxiliary flows from loading every OD pair on its shortest path
//!
//! Labels live in the tree returned by each search, not on the network, so the
//! searches of different origins are independent and can run on rayon.
//!
//! Among several equally short paths one is picked by heap order;
//! any of them is an acceptable result.
use super::flow::{LinkFlow, OdLinkFlow};
use super::network::{Network, OdIndex, Zone};
use log::debug;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Frontier entry, ordered so that `BinaryHeap` pops the smallest label first
#[derive(Debug, Copy, Clone)]
struct Frontier {
    label: f64,
    node: NodeIndex,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .label
            .total_cmp(&self.label)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of one single-source search
#[derive(Debug, Clone)]
pub struct ShortestPathTree {
    pub origin: NodeIndex,
    /// shortest distance from the origin, `f64::INFINITY` if unreachable
    pub label: Vec<f64>,
    /// last link of the shortest path to each node
    pub predecessor: Vec<Option<EdgeIndex>>,
}

impl ShortestPathTree {
    pub fn distance(&self, v: NodeIndex) -> f64 {
        self.label[v.index()]
    }
    pub fn is_reachable(&self, v: NodeIndex) -> bool {
        self.label[v.index()].is_finite()
    }
    ///
    /// Links of the shortest path from the origin to `destination`, in travel order.
    /// Empty for the origin itself and for unreachable nodes.
    ///
    pub fn path_to(&self, network: &Network, destination: NodeIndex) -> Vec<EdgeIndex> {
        let mut links = Vec::new();
        let mut v = destination;
        while let Some(e) = self.predecessor[v.index()] {
            links.push(e);
            v = network.endpoints(e).0;
        }
        links.reverse();
        links
    }
}

///
/// Dijkstra from `origin` using `Link::cost` as weight. Costs must be non-negative.
///
pub fn dijkstra(network: &Network, origin: NodeIndex) -> ShortestPathTree {
    let n = network.node_count();
    let mut label = vec![f64::INFINITY; n];
    let mut predecessor = vec![None; n];
    let mut frontier = BinaryHeap::new();

    label[origin.index()] = 0.0;
    frontier.push(Frontier {
        label: 0.0,
        node: origin,
    });

    while let Some(Frontier { label: d, node: v }) = frontier.pop() {
        // stale entry
        if d > label[v.index()] {
            continue;
        }
        for er in network.out_links(v) {
            let w = er.target();
            let new_label = d + er.weight().cost;
            if new_label < label[w.index()] {
                label[w.index()] = new_label;
                predecessor[w.index()] = Some(er.id());
                frontier.push(Frontier {
                    label: new_label,
                    node: w,
                });
            }
        }
    }

    ShortestPathTree {
        origin,
        label,
        predecessor,
    }
}

/// Auxiliary (all-or-nothing) flows of one loading pass
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliaryFlow {
    pub link_flow: LinkFlow,
    pub od_flow: OdLinkFlow,
    /// shortest-path total travel time, `sum(demand x shortest distance)`
    pub sptt: f64,
}

/// what one origin contributes to an `AuxiliaryFlow`
struct OriginLoad {
    /// (link, od, demand) for every link on every loaded path
    loads: Vec<(EdgeIndex, OdIndex, f64)>,
    sptt: f64,
}

fn load_origin(network: &Network, zone: &Zone, compute_flows: bool) -> OriginLoad {
    let tree = dijkstra(network, zone.origin);
    let mut loads = Vec::new();
    let mut sptt = 0.0;

    for &od in zone.destinations.iter() {
        let trip = network.trip(od);
        if trip.demand <= 0.0 {
            continue;
        }
        if !tree.is_reachable(trip.destination) {
            debug!(
                "destination {} is unreachable from {}, demand {} not loaded",
                network.node_id(trip.destination),
                network.node_id(trip.origin),
                trip.demand
            );
            continue;
        }
        sptt += tree.distance(trip.destination) * trip.demand;

        if compute_flows && trip.origin != trip.destination {
            loads.extend(
                tree.path_to(network, trip.destination)
                    .into_iter()
                    .map(|e| (e, od, trip.demand)),
            );
        }
    }
    OriginLoad { loads, sptt }
}

/// one search per origin with positive outgoing demand
fn run_origins(network: &Network, compute_flows: bool, parallel: bool) -> Vec<OriginLoad> {
    let zones: Vec<&Zone> = network.active_zones().collect();
    if parallel {
        zones
            .par_iter()
            .map(|zone| load_origin(network, zone, compute_flows))
            .collect()
    } else {
        zones
            .iter()
            .map(|zone| load_origin(network, zone, compute_flows))
            .collect()
    }
}

///
/// All-or-nothing loading on the current costs.
///
/// For every origin with demand, run one search and put each OD pair's demand on every link
/// of its shortest path, both in the link total and in the `(link, od)` entry.
/// Per-origin results are merged in zone order, so `parallel` does not change the output.
///
pub fn load_aon(network: &Network, parallel: bool) -> AuxiliaryFlow {
    let mut link_flow = LinkFlow::zero(network.link_count());
    let mut od_flow = OdLinkFlow::zero(network.link_count(), network.od_count());
    let mut sptt = 0.0;

    for origin_load in run_origins(network, true, parallel) {
        for (e, od, demand) in origin_load.loads {
            link_flow.add(e, demand);
            od_flow.add(e, od, demand);
        }
        sptt += origin_load.sptt;
    }

    AuxiliaryFlow {
        link_flow,
        od_flow,
        sptt,
    }
}

///
/// `sum(demand x shortest distance)` on the current costs, without building flows.
///
pub fn shortest_path_travel_time(network: &Network, parallel: bool) -> f64 {
    run_origins(network, false, parallel)
        .iter()
        .map(|origin_load| origin_load.sptt)
        .sum()
}

//
// tests
//
#[cfg(test)]
mod tests {
    use super::super::cost::CostFunction;
    use super::super::flow::{is_conserving_od_flow, is_link_flow_consistent, FLOW_EPS};
    use super::super::mocks::{mock_bottleneck_network, mock_braess_network, mock_parallel_network};
    use super::*;
    use itertools::Itertools; // for tuple_windows

    #[test]
    fn dijkstra_on_braess() {
        let (network, _) = mock_braess_network();
        let v1 = network.node_index("1").unwrap();
        let tree = dijkstra(&network, v1);
        let label = |id: &str| tree.distance(network.node_index(id).unwrap());
        assert_eq!(label("1"), 0.0);
        assert_eq!(label("2"), 1.0);
        assert_eq!(label("3"), 2.0);
        assert_eq!(label("4"), 3.0);

        // 1 -> 2 -> 3 -> 4, every link starts where the previous one ends
        let path = tree.path_to(&network, network.node_index("4").unwrap());
        assert_eq!(path.len(), 3);
        assert_eq!(network.endpoints(path[0]).0, v1);
        for (a, b) in path.iter().tuple_windows() {
            assert_eq!(network.endpoints(*a).1, network.endpoints(*b).0);
        }
        assert!(tree.path_to(&network, v1).is_empty());
    }

    #[test]
    fn unreachable_nodes_keep_infinite_label() {
        let (network, _) = mock_braess_network();
        let v4 = network.node_index("4").unwrap();
        let tree = dijkstra(&network, v4);
        assert!(!tree.is_reachable(network.node_index("1").unwrap()));
        assert!(tree
            .path_to(&network, network.node_index("1").unwrap())
            .is_empty());
    }

    #[test]
    fn aon_loads_demand_on_shortest_paths() {
        let (network, links) = mock_braess_network();
        let aux = load_aon(&network, false);
        // 1 -> 4 (6) uses 1-2, 2-3, 3-4 and 2 -> 4 (4) uses 2-3, 3-4
        assert_eq!(aux.link_flow[links[0]], 6.0);
        assert_eq!(aux.link_flow[links[1]], 0.0);
        assert_eq!(aux.link_flow[links[2]], 10.0);
        assert_eq!(aux.link_flow[links[3]], 0.0);
        assert_eq!(aux.link_flow[links[4]], 10.0);
        assert!((aux.sptt - (6.0 * 3.0 + 4.0 * 2.0)).abs() < 1e-12);
        assert!(is_link_flow_consistent(&aux.link_flow, &aux.od_flow, FLOW_EPS));
    }

    #[test]
    fn zero_demand_contributes_nothing() {
        let (network, _) = mock_braess_network();
        let od = network.find_trip("3", "4").unwrap();
        let aux = load_aon(&network, false);
        for e in network.graph().edge_indices() {
            assert_eq!(aux.od_flow.get(e, od), 0.0);
        }
    }

    #[test]
    fn origins_without_demand_are_not_searched() {
        let (mut network, _) = mock_braess_network();
        // only 3 -> 4 has demand left: one search, from 3
        let od14 = network.find_trip("1", "4").unwrap();
        let od24 = network.find_trip("2", "4").unwrap();
        network.add_trip("1", "4", 0.0).unwrap();
        network.add_trip("2", "4", 0.0).unwrap();
        network.add_trip("3", "4", 5.0).unwrap();
        let loads = run_origins(&network, true, false);
        assert_eq!(loads.len(), 1);

        let aux = load_aon(&network, false);
        assert!((aux.sptt - 5.0).abs() < 1e-12);
        for e in network.graph().edge_indices() {
            assert_eq!(aux.od_flow.get(e, od14), 0.0);
            assert_eq!(aux.od_flow.get(e, od24), 0.0);
        }
    }

    #[test]
    fn aon_conserves_flow_per_od() {
        for (mut network, _) in [mock_braess_network(), mock_bottleneck_network()] {
            // load once and route again on congested costs, so different paths get used
            let aux = load_aon(&network, false);
            network.apply_step(1.0, &aux.link_flow, &aux.od_flow);
            network.update_costs(false, CostFunction::Bpr);
            let aux = load_aon(&network, false);

            for (od, trip) in network.trips().iter().enumerate() {
                assert!(is_conserving_od_flow(
                    network.graph(),
                    &aux.od_flow,
                    od,
                    trip.origin,
                    trip.destination,
                    FLOW_EPS
                ));
            }
        }
    }

    #[test]
    fn parallel_loading_matches_serial() {
        let (network, _) = mock_bottleneck_network();
        assert_eq!(load_aon(&network, true), load_aon(&network, false));
        assert_eq!(
            shortest_path_travel_time(&network, true),
            load_aon(&network, false).sptt
        );
    }

    #[test]
    fn parallel_links_pick_any_shortest() {
        // equal costs: any of the tied links is acceptable
        let (mut network, links) = mock_parallel_network();
        for &e in links.iter() {
            network.link_mut(e).cost = 1.0;
        }
        let aux = load_aon(&network, false);
        let loaded: Vec<_> = links.iter().filter(|&&e| aux.link_flow[e] > 0.0).collect();
        assert_eq!(loaded.len(), 1);
        assert_eq!(aux.link_flow[*loaded[0]], 10.0);
    }
}
