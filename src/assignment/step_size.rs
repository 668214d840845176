//!
//! Frank-Wolfe step size.
//!
use super::bisect::find_root;
use super::cost::CostFunction;
use super::flow::{interpolate, LinkFlow};
use super::network::Network;
use crate::error::Result;
use log::debug;

/// width of the final bracket around the step size
pub const ALPHA_TOLERANCE: f64 = 1e-12;

///
/// Directional derivative of the objective along the Frank-Wolfe direction
///
/// `d(alpha) = sum_e (x_bar(e) - x(e)) * c_e(alpha x_bar(e) + (1 - alpha) x(e))`
///
pub fn directional_derivative(
    auxiliary: &LinkFlow,
    network: &Network,
    system_optimal: bool,
    cost_function: CostFunction,
    alpha: f64,
) -> f64 {
    network
        .links()
        .map(|(e, link)| {
            let flow = interpolate(alpha, auxiliary[e], link.flow);
            (auxiliary[e] - link.flow) * cost_function.link_cost(system_optimal, link, flow)
        })
        .sum()
}

///
/// Step size `alpha` in `[0, 1]` minimizing the objective on the segment from the current
/// flow to `auxiliary`.
///
/// * `d(0) < 0 < d(1)`: root of `d` by bisection
/// * `d(0) >= 0` and `d(1) >= 0`: 0, the current flow is already at least as good
/// * `d(0) <= 0` and `d(1) <= 0`: 1, move all the way
/// * otherwise (`d` decreasing or not finite): `RootNotBracketed`, the cost curve is not monotone
///
pub fn find_alpha(
    auxiliary: &LinkFlow,
    network: &Network,
    system_optimal: bool,
    cost_function: CostFunction,
) -> Result<f64> {
    let d = |alpha: f64| {
        directional_derivative(auxiliary, network, system_optimal, cost_function, alpha)
    };
    let d0 = d(0.0);
    let d1 = d(1.0);

    if d0.is_finite() && d1.is_finite() {
        if d0 >= 0.0 && d1 >= 0.0 {
            debug!("directional derivative is non-negative on [0, 1], alpha=0");
            return Ok(0.0);
        }
        if d0 <= 0.0 && d1 <= 0.0 {
            debug!("directional derivative is non-positive on [0, 1], alpha=1");
            return Ok(1.0);
        }
    }
    find_root(d, 0.0, 1.0, ALPHA_TOLERANCE)
}
