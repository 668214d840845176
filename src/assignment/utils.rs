//!
//! utils
//!
use super::network::Network;
use petgraph::dot::{Config, Dot};

///
/// check if the function `f` is convex or not
/// in the domain `[x_min, x_max]` sampled at `steps` equal intervals
///
/// it will check `f(x + h) - f(x)` is monotonically increasing
/// for increasing `x`
///
pub fn is_convex<F: Fn(f64) -> f64>(f: F, x_min: f64, x_max: f64, steps: usize) -> bool {
    let h = (x_max - x_min) / steps as f64;
    let mut y_prev = f64::MIN;

    (0..steps)
        .map(|i| {
            let x = x_min + h * i as f64;
            f(x + h) - f(x)
        })
        .all(|y| {
            // tolerate rounding on (almost) linear stretches
            let is_increasing = y >= y_prev - 1e-9 * y.abs().max(1.0);
            y_prev = y;
            is_increasing
        })
}

///
/// Render the network as Graphviz DOT, labelling each link with `flow / cost`.
///
pub fn to_dot(network: &Network) -> String {
    let labelled = network.graph().map(
        |_, node| node.id.clone(),
        |_, link| format!("{:.2} / {:.2}", link.flow, link.cost),
    );
    format!("{}", Dot::with_config(&labelled, &[Config::GraphContentOnly]))
}

#[cfg(test)]
mod tests {
    use super::super::mocks;
    use super::*;

    #[test]
    fn is_convex_test() {
        assert!(is_convex(|x| (x - 10.0).powi(2), 0.0, 20.0, 20));
        assert!(!is_convex(|x| -(x - 10.0).powi(2), 0.0, 20.0, 20));
        assert!(is_convex(|x| 3.0 * x, 0.0, 20.0, 20));
    }

    #[test]
    fn dot_has_every_link() {
        let (network, _) = mocks::mock_parallel_network();
        let dot = to_dot(&network);
        assert_eq!(dot.matches("->").count(), network.link_count());
        assert!(dot.contains("\"O\""));
    }
}
