//! # `Network`
//!
//! Road network with travel demand.
//!
//! `Network` owns a `RoadGraph`, a DiGraph whose node weight is `Node` and whose edge weight
//! is `Link`, together with
//! * the OD pairs (`Trip`) indexed by `OdIndex` and grouped into origin `Zone`s
//! * the per-OD link flow, a `links x ODs` matrix
//! * an optional UE baseline (link flows, per-OD link flows, per-OD time bounds)
//!
//! Topology and link parameters are fixed once built; the assignment only mutates
//! `Link::flow`, `Link::cost` and the per-OD flow.
//!
use super::cost::CostFunction;
use super::flow::{interpolate, LinkFlow, OdLinkFlow};
use crate::error::{AssignmentError, Result};
use petgraph::graph::{DiGraph, EdgeIndex, EdgeReference, NodeIndex};
use petgraph::visit::EdgeRef; // for EdgeReference.id()
use std::collections::HashMap;

/// Index of an OD pair in `Network::trips()`
pub type OdIndex = usize;

/// Network graph definition
pub type RoadGraph = DiGraph<Node, Link>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Edge attributes used in RoadGraph.
///
/// It has
/// * free-flow travel time `t0`
/// * BPR shape parameters `alpha`, `beta`
/// * physical capacity and the current (throttled) capacity
/// * length, speed limit, toll and a type tag
/// * current flow and cost, mutated by the assignment
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub free_flow_time: f64,
    pub alpha: f64,
    pub beta: f64,
    /// physical capacity (veh per hour)
    pub max_capacity: f64,
    /// `max_capacity * capacity_percentage`
    pub capacity: f64,
    pub capacity_percentage: f64,
    pub length: f64,
    pub speed_limit: f64,
    pub toll: f64,
    pub link_type: String,
    pub flow: f64,
    pub cost: f64,
}

impl Link {
    pub fn new(free_flow_time: f64, capacity: f64, alpha: f64, beta: f64) -> Link {
        Link {
            free_flow_time,
            alpha,
            beta,
            max_capacity: capacity,
            capacity,
            capacity_percentage: 1.0,
            length: 0.0,
            speed_limit: 0.0,
            toll: 0.0,
            link_type: String::new(),
            flow: 0.0,
            cost: free_flow_time,
        }
    }
    pub fn with_geometry(mut self, length: f64, speed_limit: f64) -> Link {
        self.length = length;
        self.speed_limit = speed_limit;
        self
    }
    pub fn with_toll(mut self, toll: f64, link_type: impl Into<String>) -> Link {
        self.toll = toll;
        self.link_type = link_type.into();
        self
    }
    ///
    /// Shift the capacity percentage by `delta` (clamped to `[0, 1]`)
    /// and recompute the current capacity.
    /// A `delta` outside `[-1, 1]` (or NaN) is `InvalidConfig` and leaves the link untouched.
    ///
    pub fn modify_capacity(&mut self, delta: f64) -> Result<()> {
        if !(-1.0..=1.0).contains(&delta) {
            return Err(AssignmentError::InvalidConfig(format!(
                "capacity delta {} is outside [-1, 1]",
                delta
            )));
        }
        self.capacity_percentage = (self.capacity_percentage + delta).clamp(0.0, 1.0);
        self.capacity = self.max_capacity * self.capacity_percentage;
        Ok(())
    }
    pub fn reset(&mut self) {
        self.capacity_percentage = 1.0;
        self.capacity = self.max_capacity;
        self.reset_flow();
    }
    pub fn reset_flow(&mut self) {
        self.flow = 0.0;
        self.cost = self.free_flow_time;
    }
}

/// OD pair with its demand and, for constrained runs, the UE bound on `sum(flow x time)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trip {
    pub origin: NodeIndex,
    pub destination: NodeIndex,
    pub demand: f64,
    pub ue_bound: Option<f64>,
}

/// Origin with the OD pairs leaving it
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub origin: NodeIndex,
    pub destinations: Vec<OdIndex>,
}

#[derive(Debug, Clone, Default)]
pub struct Network {
    graph: RoadGraph,
    node_ids: HashMap<String, NodeIndex>,
    trips: Vec<Trip>,
    trip_ids: HashMap<(NodeIndex, NodeIndex), OdIndex>,
    zones: Vec<Zone>,
    od_flow: OdLinkFlow,
    ue_flow: LinkFlow,
    ue_od_flow: OdLinkFlow,
    has_ue_flow: bool,
}

impl Network {
    pub fn new() -> Network {
        Network::default()
    }

    //
    // topology
    //

    /// Node index of `id`, adding the node if it is new
    pub fn add_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&v) = self.node_ids.get(id) {
            return v;
        }
        let v = self.graph.add_node(Node { id: id.to_string() });
        self.node_ids.insert(id.to_string(), v);
        v
    }
    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.node_ids.get(id).copied()
    }
    pub fn node_id(&self, v: NodeIndex) -> &str {
        &self.graph[v].id
    }
    pub fn add_link(&mut self, init: &str, term: &str, link: Link) -> EdgeIndex {
        let v = self.add_node(init);
        let w = self.add_node(term);
        let e = self.graph.add_edge(v, w, link);
        self.reshape();
        e
    }
    /// First link `init -> term`
    pub fn find_link(&self, init: &str, term: &str) -> Option<EdgeIndex> {
        let v = self.node_index(init)?;
        let w = self.node_index(term)?;
        self.graph.find_edge(v, w)
    }
    /// Every link `init -> term` in index order; parallel links give more than one
    pub fn find_links(&self, init: &str, term: &str) -> Vec<EdgeIndex> {
        match (self.node_index(init), self.node_index(term)) {
            (Some(v), Some(w)) => {
                let mut links: Vec<EdgeIndex> =
                    self.graph.edges_connecting(v, w).map(|er| er.id()).collect();
                links.sort();
                links
            }
            _ => Vec::new(),
        }
    }
    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }
    pub fn link(&self, e: EdgeIndex) -> &Link {
        &self.graph[e]
    }
    pub fn link_mut(&mut self, e: EdgeIndex) -> &mut Link {
        &mut self.graph[e]
    }
    pub fn links(&self) -> impl Iterator<Item = (EdgeIndex, &Link)> + '_ {
        self.graph.edge_indices().map(move |e| (e, &self.graph[e]))
    }
    /// Links leaving `v`
    pub fn out_links(&self, v: NodeIndex) -> impl Iterator<Item = EdgeReference<'_, Link>> {
        self.graph.edges(v)
    }
    pub fn endpoints(&self, e: EdgeIndex) -> (NodeIndex, NodeIndex) {
        self.graph
            .edge_endpoints(e)
            .expect("edge index belongs to this network")
    }
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    //
    // demand
    //

    ///
    /// Register demand between two existing nodes. Demand of a known OD pair is replaced.
    ///
    pub fn add_trip(&mut self, origin: &str, destination: &str, demand: f64) -> Result<OdIndex> {
        let r = self
            .node_index(origin)
            .ok_or_else(|| AssignmentError::UnknownNode(origin.to_string()))?;
        let s = self
            .node_index(destination)
            .ok_or_else(|| AssignmentError::UnknownNode(destination.to_string()))?;

        if let Some(&od) = self.trip_ids.get(&(r, s)) {
            self.trips[od].demand = demand;
            return Ok(od);
        }

        let od = self.trips.len();
        self.trips.push(Trip {
            origin: r,
            destination: s,
            demand,
            ue_bound: None,
        });
        self.trip_ids.insert((r, s), od);
        match self.zones.iter_mut().find(|z| z.origin == r) {
            Some(zone) => zone.destinations.push(od),
            None => self.zones.push(Zone {
                origin: r,
                destinations: vec![od],
            }),
        }
        self.reshape();
        Ok(od)
    }
    pub fn find_trip(&self, origin: &str, destination: &str) -> Option<OdIndex> {
        let r = self.node_index(origin)?;
        let s = self.node_index(destination)?;
        self.trip_ids.get(&(r, s)).copied()
    }
    pub fn trip(&self, od: OdIndex) -> &Trip {
        &self.trips[od]
    }
    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }
    pub fn od_count(&self) -> usize {
        self.trips.len()
    }
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }
    /// Zones with positive outgoing demand, the only origins that need a search
    pub fn active_zones(&self) -> impl Iterator<Item = &Zone> + '_ {
        self.zones.iter().filter(move |zone| {
            zone.destinations
                .iter()
                .any(|&od| self.trips[od].demand > 0.0)
        })
    }
    pub fn total_demand(&self) -> f64 {
        self.trips.iter().map(|t| t.demand.max(0.0)).sum()
    }

    //
    // UE baseline
    //

    /// Bound on `sum(per-OD flow x link time)` of `od`, i.e. UE time x UE flow
    pub fn set_ue_bound(&mut self, od: OdIndex, bound: f64) {
        self.trips[od].ue_bound = Some(bound);
    }
    ///
    /// Add a baseline UE flow on link `e`. The flow counts toward the link total; if `od` is
    /// given it is also recorded as that OD pair's share of the link.
    ///
    pub fn add_ue_flow(&mut self, e: EdgeIndex, od: Option<OdIndex>, flow: f64) {
        self.has_ue_flow = true;
        self.ue_flow.add(e, flow);
        if let Some(od) = od {
            self.ue_od_flow.add(e, od, flow);
        }
    }
    pub fn has_ue_flow(&self) -> bool {
        self.has_ue_flow
    }
    pub fn ue_flow(&self) -> &LinkFlow {
        &self.ue_flow
    }
    ///
    /// Every OD pair with positive demand needs a UE bound before a constrained run.
    ///
    pub fn check_ue_bounds(&self) -> Result<()> {
        match self
            .trips
            .iter()
            .find(|t| t.demand > 0.0 && t.ue_bound.is_none())
        {
            Some(t) => Err(AssignmentError::MissingBaseline {
                origin: self.node_id(t.origin).to_string(),
                destination: self.node_id(t.destination).to_string(),
            }),
            None => Ok(()),
        }
    }

    //
    // flow state
    //

    /// per-OD link flow of the current assignment
    pub fn od_flow(&self) -> &OdLinkFlow {
        &self.od_flow
    }
    /// snapshot of the current link flows
    pub fn link_flow(&self) -> LinkFlow {
        LinkFlow::from_vec(self.graph.edge_weights().map(|l| l.flow).collect())
    }
    /// Zero every flow and set each cost back to its free-flow time.
    pub fn reset_flow(&mut self) {
        for link in self.graph.edge_weights_mut() {
            link.reset_flow();
        }
        self.od_flow.clear();
    }
    /// `reset_flow` plus undo any capacity throttling
    pub fn reset(&mut self) {
        for link in self.graph.edge_weights_mut() {
            link.reset();
        }
        self.od_flow.clear();
    }
    ///
    /// Seed link and per-OD flows from the UE baseline. Links without baseline flow get zero.
    /// Costs are left untouched; call `update_costs` afterwards.
    ///
    pub fn set_ue_flow(&mut self) {
        for e in self.graph.edge_indices() {
            self.graph[e].flow = self.ue_flow[e];
        }
        self.od_flow = self.ue_od_flow.clone();
    }
    /// Recompute every link cost from its current flow
    pub fn update_costs(&mut self, system_optimal: bool, cost_function: CostFunction) {
        for link in self.graph.edge_weights_mut() {
            link.cost = cost_function.link_cost(system_optimal, link, link.flow);
        }
    }
    ///
    /// Move to `alpha * auxiliary + (1 - alpha) * current`, for link flows and per-OD flows.
    ///
    pub fn apply_step(&mut self, alpha: f64, auxiliary: &LinkFlow, auxiliary_od: &OdLinkFlow) {
        for e in self.graph.edge_indices() {
            let link = &mut self.graph[e];
            link.flow = interpolate(alpha, auxiliary[e], link.flow);
            for (current, &aux) in self.od_flow.row_mut(e).iter_mut().zip(auxiliary_od.row(e)) {
                *current = interpolate(alpha, aux, *current);
            }
        }
    }
    /// `sum(flow x cost)` with the costs the assignment routes on (marginal for SO)
    pub fn tstt(&self) -> f64 {
        self.graph.edge_weights().map(|l| l.flow * l.cost).sum()
    }
    ///
    /// Real total system travel time: `sum(flow x t(flow))` with the average travel time at
    /// each link's physical max capacity, whatever cost the assignment routed on.
    ///
    pub fn real_tstt(&self, cost_function: CostFunction) -> f64 {
        self.graph
            .edge_weights()
            .map(|l| l.flow * cost_function.link_time_at_max_capacity(l, l.flow))
            .sum()
    }

    /// keep the flow buffers in step with the number of links and OD pairs
    fn reshape(&mut self) {
        let (n_links, n_ods) = (self.graph.edge_count(), self.trips.len());
        self.od_flow.resize(n_links, n_ods);
        self.ue_od_flow.resize(n_links, n_ods);
        self.ue_flow.resize(n_links);
    }
}
