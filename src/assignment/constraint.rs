//!
//! Constrained system optimum: every OD pair's total travel time
//! `sum_e x_od(e) t_e(x(e))` must stay within its UE baseline bound.
//!
//! Times are always realized (average) travel times, also when the assignment routes on
//! marginal costs.
//!
use super::bisect::bisect;
use super::cost::CostFunction;
use super::flow::{interpolate, LinkFlow, OdLinkFlow};
use super::network::Network;
use log::debug;

/// step sizes closer than this are not told apart; a feasible step below it means stalled
pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;

///
/// Total travel time of every OD pair if flows moved to
/// `alpha * auxiliary + (1 - alpha) * current`.
///
pub fn od_times_at(
    auxiliary: &LinkFlow,
    auxiliary_od: &OdLinkFlow,
    network: &Network,
    alpha: f64,
    cost_function: CostFunction,
) -> Vec<f64> {
    let mut od_times = vec![0.0; network.od_count()];
    let current_od = network.od_flow();
    for (e, link) in network.links() {
        let time = cost_function.link_cost(false, link, interpolate(alpha, auxiliary[e], link.flow));
        for ((od_time, &aux), &current) in od_times
            .iter_mut()
            .zip(auxiliary_od.row(e))
            .zip(current_od.row(e))
        {
            *od_time += interpolate(alpha, aux, current) * time;
        }
    }
    od_times
}

///
/// Total travel time of every OD pair under the current flows.
///
pub fn od_travel_times(network: &Network, cost_function: CostFunction) -> Vec<f64> {
    let mut od_times = vec![0.0; network.od_count()];
    for (e, link) in network.links() {
        let time = cost_function.link_cost(false, link, link.flow);
        for (od_time, &flow) in od_times.iter_mut().zip(network.od_flow().row(e)) {
            *od_time += flow * time;
        }
    }
    od_times
}

///
/// Whether the step `alpha` keeps every OD pair with positive demand within its UE bound.
/// OD pairs without a bound are not constrained.
///
pub fn check_constraints(
    auxiliary: &LinkFlow,
    auxiliary_od: &OdLinkFlow,
    network: &Network,
    alpha: f64,
    cost_function: CostFunction,
) -> bool {
    let od_times = od_times_at(auxiliary, auxiliary_od, network, alpha, cost_function);
    network
        .trips()
        .iter()
        .zip(od_times)
        .filter(|(trip, _)| trip.demand > 0.0)
        .all(|(trip, time)| match trip.ue_bound {
            Some(bound) => time <= bound,
            None => true,
        })
}

///
/// Largest step in `[0, alpha_upper]` found feasible by bisection.
///
/// `low` is feasible (initially 0, the accepted current flow) and `high` is not
/// (initially `alpha_upper`); the bracket shrinks to [`FEASIBILITY_TOLERANCE`] and `low`
/// is returned. A result below the tolerance means the flow sits on the constraint boundary.
///
pub fn make_alpha_feasible(
    auxiliary: &LinkFlow,
    auxiliary_od: &OdLinkFlow,
    network: &Network,
    alpha_upper: f64,
    cost_function: CostFunction,
) -> f64 {
    let (low, high) = bisect(0.0, alpha_upper, FEASIBILITY_TOLERANCE, |alpha| {
        check_constraints(auxiliary, auxiliary_od, network, alpha, cost_function)
    });
    debug!(
        "feasible step {:.3e} (infeasible above {:.3e}, requested {:.3e})",
        low, high, alpha_upper
    );
    low
}
