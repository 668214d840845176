pub mod bisect;
pub mod constraint;
pub mod cost;
pub mod flow;
pub mod mocks;
pub mod network;
pub mod shortest_path;
pub mod step_size;
pub mod utils;

use crate::error::{AssignmentError, Result};
use constraint::{check_constraints, make_alpha_feasible, od_travel_times, FEASIBILITY_TOLERANCE};
use cost::CostFunction;
use log::{debug, info, warn};
use network::Network;
use shortest_path::{load_aon, shortest_path_travel_time};
use std::time::{Duration, Instant};
use step_size::find_alpha;

//
// configuration
//

/// Step-size rule
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Frank-Wolfe: exact line search along the AON direction
    #[default]
    FrankWolfe,
    /// Method of successive averages: `alpha = 1 / iteration`
    Msa,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::FrankWolfe => write!(f, "FW"),
            Algorithm::Msa => write!(f, "MSA"),
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = AssignmentError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FW" => Ok(Algorithm::FrankWolfe),
            "MSA" => Ok(Algorithm::Msa),
            _ => Err(AssignmentError::UnknownAlgorithm(s.to_string())),
        }
    }
}

///
/// Parameters of one assignment run
///
#[derive(Debug, Clone)]
pub struct AssignmentConfig {
    pub algorithm: Algorithm,
    /// route on marginal costs (SO) instead of travel times (UE)
    pub system_optimal: bool,
    pub cost_function: CostFunction,
    /// target relative gap
    pub accuracy: f64,
    pub max_iter: usize,
    pub max_time: Duration,
    /// keep every OD pair within its UE baseline time, starting from the UE baseline flows
    pub cso: bool,
    /// run the per-origin shortest path searches on rayon
    pub parallel: bool,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        AssignmentConfig {
            algorithm: Algorithm::FrankWolfe,
            system_optimal: false,
            cost_function: CostFunction::Bpr,
            accuracy: 1e-4,
            max_iter: 1000,
            max_time: Duration::from_secs(60),
            cso: false,
            parallel: false,
        }
    }
}

impl AssignmentConfig {
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
    pub fn with_system_optimal(mut self, system_optimal: bool) -> Self {
        self.system_optimal = system_optimal;
        self
    }
    pub fn with_cost_function(mut self, cost_function: CostFunction) -> Self {
        self.cost_function = cost_function;
        self
    }
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = max_time;
        self
    }
    pub fn with_cso(mut self, cso: bool) -> Self {
        self.cso = cso;
        self
    }
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
    pub fn validate(&self) -> Result<()> {
        if !(self.accuracy > 0.0) {
            return Err(AssignmentError::InvalidConfig(format!(
                "accuracy must be positive, got {}",
                self.accuracy
            )));
        }
        if self.max_iter == 0 {
            return Err(AssignmentError::InvalidConfig(
                "max_iter must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

//
// result
//

/// How the iteration ended
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Termination {
    /// relative gap reached the accuracy
    Converged,
    MaxIterReached,
    Timeout,
    /// constrained step collapsed to zero: the flow sits on the boundary of the feasible region
    CsoStalled,
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        *self == Termination::Converged
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Termination::Converged => "converged",
            Termination::MaxIterReached => "max iterations reached",
            Termination::Timeout => "time limit reached",
            Termination::CsoStalled => "stalled at the CSO constraint boundary",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    pub alpha: f64,
    pub gap: f64,
    /// real total system travel time after the step
    pub tstt: f64,
    pub sptt: f64,
    /// constrained runs only: total travel time of every OD pair after the step,
    /// the quantity held within its UE bound. Empty otherwise.
    pub od_times: Vec<f64>,
}

///
/// Outcome of `assign`. Final link flows/costs and per-OD flows stay on the `Network`.
///
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentResult {
    pub status: Termination,
    /// completed iterations
    pub iterations: usize,
    /// last relative gap (infinite if no iteration completed)
    pub gap: f64,
    /// real total system travel time of the final flows
    pub tstt: f64,
    pub history: Vec<IterationRecord>,
    pub elapsed: Duration,
}

//
// public functions
//

///
/// Run the assignment on `network` until the relative gap reaches `config.accuracy`,
/// or the iteration/time budget runs out, or (CSO) the feasible step collapses.
///
/// Each iteration: AON loading, step size (MSA schedule or line search, repaired to stay
/// within the UE bounds for CSO), flow update, cost update, relative gap
/// `TSTT / SPTT - 1`.
///
pub fn assign(network: &mut Network, config: &AssignmentConfig) -> Result<AssignmentResult> {
    config.validate()?;
    let so = config.system_optimal;
    let cost_function = config.cost_function;

    // a warm start is already a feasible flow, a cold one has to be loaded first
    let warm_start = config.cso && network.has_ue_flow();
    if config.cso {
        network.check_ue_bounds()?;
        if !warm_start {
            warn!("constrained assignment without UE baseline flows, starting from zero flow");
        }
        network.set_ue_flow();
    } else {
        network.reset_flow();
    }
    network.update_costs(so, cost_function);

    info!(
        "assignment {} {}{} with {} cost: {} nodes, {} links, {} OD pairs",
        config.algorithm,
        if so { "SO" } else { "UE" },
        if config.cso { " (CSO)" } else { "" },
        cost_function,
        network.node_count(),
        network.link_count(),
        network.od_count()
    );

    let started = Instant::now();
    let mut history = Vec::new();
    let mut iteration = 1;
    let mut gap = f64::INFINITY;

    let status = loop {
        let aux = load_aon(network, config.parallel);

        let mut alpha = match config.algorithm {
            Algorithm::Msa => 1.0 / iteration as f64,
            Algorithm::FrankWolfe if iteration == 1 && !warm_start => 1.0,
            Algorithm::FrankWolfe => find_alpha(&aux.link_flow, network, so, cost_function)?,
        };

        if config.cso {
            if !check_constraints(&aux.link_flow, &aux.od_flow, network, alpha, cost_function) {
                let feasible =
                    make_alpha_feasible(&aux.link_flow, &aux.od_flow, network, alpha, cost_function);
                debug!("iteration {}: step {:.6} made feasible: {:.6}", iteration, alpha, feasible);
                alpha = feasible;
            }
            if alpha < FEASIBILITY_TOLERANCE {
                info!(
                    "iteration {}: feasible step below {:e}, stopping at the constraint boundary",
                    iteration, FEASIBILITY_TOLERANCE
                );
                break Termination::CsoStalled;
            }
        }

        network.apply_step(alpha, &aux.link_flow, &aux.od_flow);
        network.update_costs(so, cost_function);

        let sptt = shortest_path_travel_time(network, config.parallel);
        let routed_tstt = network.tstt();
        gap = relative_gap(routed_tstt, sptt);
        if gap < 0.0 {
            warn!(
                "iteration {}: negative relative gap {:.6e} (TSTT {} < SPTT {}), check link capacities and cost curves",
                iteration, gap, routed_tstt, sptt
            );
        }

        let tstt = network.real_tstt(cost_function);
        let od_times = if config.cso {
            od_travel_times(network, cost_function)
        } else {
            Vec::new()
        };
        history.push(IterationRecord {
            iteration,
            alpha,
            gap,
            tstt,
            sptt,
            od_times,
        });
        debug!(
            "iteration {}: alpha={:.6} gap={:.6e} tstt={:.6}",
            iteration, alpha, gap, tstt
        );
        if iteration % 100 == 0 {
            info!("iteration {}: gap {:.6e}", iteration, gap);
        }

        if gap <= config.accuracy {
            break Termination::Converged;
        }
        if iteration >= config.max_iter {
            break Termination::MaxIterReached;
        }
        if started.elapsed() > config.max_time {
            break Termination::Timeout;
        }
        iteration += 1;
    };

    let result = AssignmentResult {
        status,
        iterations: history.len(),
        gap,
        tstt: network.real_tstt(cost_function),
        history,
        elapsed: started.elapsed(),
    };
    info!(
        "assignment {} after {} iterations in {:.3}s, gap {:.6e}, total travel time {:.6}",
        result.status,
        result.iterations,
        result.elapsed.as_secs_f64(),
        result.gap,
        result.tstt
    );
    Ok(result)
}

//
// internal functions
//

/// `TSTT / SPTT - 1`; zero when there is nothing to route
fn relative_gap(tstt: f64, sptt: f64) -> f64 {
    if sptt > 0.0 {
        tstt / sptt - 1.0
    } else if tstt > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

//
// tests
//
#[cfg(test)]
mod tests {
    use super::flow::{is_conserving_od_flow, is_link_flow_consistent};
    use super::mocks::{mock_bottleneck_network, mock_braess_network, mock_parallel_network};
    use super::*;

    fn ue() -> AssignmentConfig {
        AssignmentConfig::default()
            .with_accuracy(1e-7)
            .with_max_iter(20000)
            .with_max_time(Duration::from_secs(600))
    }

    /// Solve UE on `network` and install the result as its CSO baseline.
    fn install_ue_baseline(network: &mut Network) {
        assign(network, &ue()).unwrap();
        let ue_od_flow = network.od_flow().clone();
        for e in network.graph().edge_indices() {
            for od in 0..network.od_count() {
                let f = ue_od_flow.get(e, od);
                if f > 0.0 {
                    network.add_ue_flow(e, Some(od), f);
                }
            }
        }
        // bounds evaluated on the seeded flows, as a CSO run will see them
        network.set_ue_flow();
        for (od, bound) in od_travel_times(network, CostFunction::Bpr)
            .into_iter()
            .enumerate()
        {
            network.set_ue_bound(od, bound);
        }
    }

    #[test]
    fn parallel_links_ue_equalizes_times() {
        let (mut network, links) = mock_parallel_network();
        let result = assign(&mut network, &ue()).unwrap();
        assert!(result.gap <= 1e-3);

        // t = 240/11 on every link
        let t = 240.0 / 11.0;
        for &e in links.iter() {
            assert!((network.link(e).cost - t).abs() < 0.05, "{:?}", network.link(e));
        }
        let total: f64 = links.iter().map(|&e| network.link(e).flow).sum();
        assert!((total - 10.0).abs() < 1e-9);
    }

    #[test]
    fn parallel_links_so_beats_ue() {
        let (mut network, links) = mock_parallel_network();
        let ue_result = assign(&mut network, &ue()).unwrap();

        let so_result = assign(&mut network, &ue().with_system_optimal(true)).unwrap();
        assert!(so_result.tstt < ue_result.tstt);

        // marginal costs 5 + 5x, 10 + 10y, 15 + 15z are equal at the optimum: x = 67/11
        let m = 390.0 / 11.0;
        for &e in links.iter() {
            assert!((network.link(e).cost - m).abs() < 0.05);
        }
        assert!((network.link(links[0]).flow - 67.0 / 11.0).abs() < 0.05);
    }

    #[test]
    fn gap_trends_to_zero() {
        let (mut network, _) = mock_braess_network();
        let result = assign(&mut network, &ue().with_max_iter(200)).unwrap();
        let first = result.history.first().unwrap().gap;
        assert!(result.gap < first);
        assert!(result.gap < 1e-2);
    }

    #[test]
    fn assignment_keeps_flows_consistent() {
        let (mut network, _) = mock_bottleneck_network();
        assign(&mut network, &ue().with_max_iter(50)).unwrap();
        assert!(is_link_flow_consistent(&network.link_flow(), network.od_flow(), 1e-6));
        for (od, trip) in network.trips().iter().enumerate() {
            assert!(is_conserving_od_flow(
                network.graph(),
                network.od_flow(),
                od,
                trip.origin,
                trip.destination,
                1e-6
            ));
        }
    }

    #[test]
    fn msa_converges_slowly_but_surely() {
        let (mut network, _) = mock_parallel_network();
        let config = ue()
            .with_algorithm(Algorithm::Msa)
            .with_accuracy(1e-3)
            .with_max_iter(5000);
        let result = assign(&mut network, &config).unwrap();
        assert_eq!(result.history[0].alpha, 1.0);
        assert_eq!(result.history[1].alpha, 0.5);
        assert!(result.gap < 0.05);
    }

    #[test]
    fn max_iter_stops_the_run() {
        let (mut network, _) = mock_bottleneck_network();
        let config = ue().with_accuracy(1e-9).with_max_iter(3);
        let result = assign(&mut network, &config).unwrap();
        assert_eq!(result.status, Termination::MaxIterReached);
        assert_eq!(result.iterations, 3);
        assert!(!result.status.is_converged());
    }

    #[test]
    fn timeout_stops_the_run() {
        let (mut network, _) = mock_bottleneck_network();
        let config = ue()
            .with_accuracy(1e-9)
            .with_max_time(Duration::from_secs(0));
        let result = assign(&mut network, &config).unwrap();
        assert_eq!(result.status, Termination::Timeout);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn constant_costs_converge_immediately() {
        let (mut network, links) = mock_parallel_network();
        let config = ue().with_cost_function(CostFunction::Constant);
        let result = assign(&mut network, &config).unwrap();
        assert_eq!(result.status, Termination::Converged);
        assert_eq!(result.iterations, 1);
        assert_eq!(network.link(links[0]).flow, 10.0);
        assert!((result.tstt - 50.0).abs() < 1e-12);
    }

    #[test]
    fn cso_stays_within_ue_times() {
        let (mut network, _) = mock_bottleneck_network();
        install_ue_baseline(&mut network);
        let bounds: Vec<f64> = network.trips().iter().map(|t| t.ue_bound.unwrap()).collect();

        // every prefix of the run is a run with a smaller budget
        for max_iter in [1, 2, 5, 20] {
            let config = ue()
                .with_system_optimal(true)
                .with_cso(true)
                .with_max_iter(max_iter);
            let result = assign(&mut network, &config).unwrap();
            let times = od_travel_times(&network, CostFunction::Bpr);
            for (time, bound) in times.iter().zip(bounds.iter()) {
                assert!(time <= bound, "{} > {} ({})", time, bound, result.status);
            }
        }
    }

    #[test]
    fn cso_history_never_exceeds_bounds() {
        let (mut network, _) = mock_bottleneck_network();
        install_ue_baseline(&mut network);
        let bounds: Vec<f64> = network.trips().iter().map(|t| t.ue_bound.unwrap()).collect();

        let config = ue()
            .with_system_optimal(true)
            .with_cso(true)
            .with_max_iter(40);
        let result = assign(&mut network, &config).unwrap();
        assert!(!result.history.is_empty());
        for record in result.history.iter() {
            assert_eq!(record.od_times.len(), bounds.len());
            for (time, bound) in record.od_times.iter().zip(bounds.iter()) {
                assert!(
                    time <= bound,
                    "iteration {}: {} > {}",
                    record.iteration,
                    time,
                    bound
                );
            }
        }
        // the last record is the returned state
        let last = result.history.last().unwrap();
        assert_eq!(last.od_times, od_travel_times(&network, CostFunction::Bpr));

        // unconstrained runs do not carry per-OD times
        let result = assign(&mut network, &ue().with_max_iter(5)).unwrap();
        assert!(result.history.iter().all(|r| r.od_times.is_empty()));
    }

    #[test]
    fn cso_does_not_lose_to_ue() {
        let (mut network, _) = mock_bottleneck_network();
        install_ue_baseline(&mut network);
        network.set_ue_flow();
        let ue_tstt = network.real_tstt(CostFunction::Bpr);

        let config = ue().with_system_optimal(true).with_cso(true).with_max_iter(200);
        let result = assign(&mut network, &config).unwrap();
        assert!(result.tstt <= ue_tstt + 1e-6);
    }

    #[test]
    fn cso_stalls_when_nothing_is_feasible() {
        let (mut network, _) = mock_parallel_network();
        // starting from zero flow, any step costs time but the bound allows none
        network.set_ue_bound(0, 0.0);
        let config = ue().with_system_optimal(true).with_cso(true);
        let result = assign(&mut network, &config).unwrap();
        assert_eq!(result.status, Termination::CsoStalled);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.tstt, 0.0);
    }

    #[test]
    fn cso_requires_bounds() {
        let (mut network, _) = mock_parallel_network();
        let config = ue().with_cso(true);
        assert!(matches!(
            assign(&mut network, &config),
            Err(AssignmentError::MissingBaseline { .. })
        ));
    }

    #[test]
    fn parallel_run_matches_serial() {
        let (mut a, _) = mock_bottleneck_network();
        let (mut b, _) = mock_bottleneck_network();
        let config = ue().with_max_iter(30);
        let ra = assign(&mut a, &config).unwrap();
        let rb = assign(&mut b, &config.clone().with_parallel(true)).unwrap();
        assert_eq!(ra.history, rb.history);
        assert_eq!(a.link_flow(), b.link_flow());
    }

    #[test]
    fn unknown_selectors_fail() {
        assert!(matches!(
            "SimplicialDecomposition".parse::<Algorithm>(),
            Err(AssignmentError::UnknownAlgorithm(_))
        ));
        assert_eq!("msa".parse::<Algorithm>().unwrap(), Algorithm::Msa);
        assert!(AssignmentConfig::default().with_accuracy(0.0).validate().is_err());
    }

    #[test]
    fn relative_gap_edge_cases() {
        assert_eq!(relative_gap(0.0, 0.0), 0.0);
        assert!((relative_gap(11.0, 10.0) - 0.1).abs() < 1e-12);
        assert!(relative_gap(9.0, 10.0) < 0.0);
    }
}
