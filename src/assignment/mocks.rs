use super::network::{Link, Network};
use petgraph::graph::EdgeIndex;

// mock network generation functions

///
/// Three parallel links `O -> D` with free-flow times 5, 10, 15,
/// linear BPR curves (alpha = beta = 1, capacity 2) and demand 10.
///
/// At UE all three links are used and share the time 240/11.
///
pub fn mock_parallel_network() -> (Network, Vec<EdgeIndex>) {
    let mut network = Network::new();
    let links = [5.0, 10.0, 15.0]
        .iter()
        .map(|&fft| network.add_link("O", "D", Link::new(fft, 2.0, 1.0, 1.0)))
        .collect();
    network.add_trip("O", "D", 10.0).unwrap();
    (network, links)
}

///
/// Braess-like network with BPR(0.15, 4) curves
///
/// ```text
///   1 ---> 2
///   |    / |
///   v   v  v
///   3 ---> 4
/// ```
///
/// OD pairs `1 -> 4` (6), `2 -> 4` (4) and `3 -> 4` (0).
///
pub fn mock_braess_network() -> (Network, Vec<EdgeIndex>) {
    let mut network = Network::new();
    let links = vec![
        network.add_link("1", "2", Link::new(1.0, 4.0, 0.15, 4.0)),
        network.add_link("1", "3", Link::new(5.0, 10.0, 0.15, 4.0)),
        network.add_link("2", "3", Link::new(1.0, 4.0, 0.15, 4.0)),
        network.add_link("2", "4", Link::new(5.0, 10.0, 0.15, 4.0)),
        network.add_link("3", "4", Link::new(1.0, 4.0, 0.15, 4.0)),
    ];
    network.add_trip("1", "4", 6.0).unwrap();
    network.add_trip("2", "4", 4.0).unwrap();
    network.add_trip("3", "4", 0.0).unwrap();
    (network, links)
}

///
/// Two origins sharing a bottleneck `m -> d`, each with a slower private bypass.
///
/// ```text
///   a --\         /--> d
///        +-> m --+
///   b --/
///   a -----------------> d  (bypass)
///   b -----------------> d  (bypass)
/// ```
///
/// Every link carries a Greenshields-compatible length and speed limit.
///
pub fn mock_bottleneck_network() -> (Network, Vec<EdgeIndex>) {
    let mut network = Network::new();
    let links = vec![
        network.add_link("a", "m", Link::new(1.0, 40.0, 0.15, 4.0).with_geometry(1.0, 60.0)),
        network.add_link("b", "m", Link::new(1.0, 40.0, 0.15, 4.0).with_geometry(1.0, 60.0)),
        network.add_link("m", "d", Link::new(2.0, 15.0, 0.15, 4.0).with_geometry(2.0, 60.0)),
        network.add_link("a", "d", Link::new(6.0, 30.0, 0.15, 4.0).with_geometry(6.0, 60.0)),
        network.add_link("b", "d", Link::new(4.0, 30.0, 0.15, 4.0).with_geometry(4.0, 60.0)),
    ];
    network.add_trip("a", "d", 12.0).unwrap();
    network.add_trip("b", "d", 18.0).unwrap();
    (network, links)
}
