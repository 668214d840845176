//!
//! Link cost (volume-delay) functions.
//!
//! Every curve shares the signature of [`CostFn`]. With `system_optimal` set it returns the
//! marginal cost `d(x t(x)) / dx`, otherwise the average travel time `t(x)`.
//!
use super::network::Link;
use crate::error::AssignmentError;

/// Cost of a link that cannot carry flow.
/// Large but finite, so step-size root finding stays well defined.
pub const INFINITE_COST: f64 = f32::MAX as f64;

/// capacities below this are treated as a closed link
pub const MIN_CAPACITY: f64 = 1e-3;

/// `(system_optimal, free_flow_time, alpha, flow, capacity, beta, length, speed_limit) -> cost`
pub type CostFn = fn(bool, f64, f64, f64, f64, f64, f64, f64) -> f64;

///
/// Volume-delay curve used by an assignment run.
///
/// The three built-in curves are dispatched through plain function pointers;
/// `Custom` accepts any function with the same signature.
///
#[derive(Debug, Copy, Clone, Default)]
pub enum CostFunction {
    /// Bureau of Public Roads curve `t0 (1 + a (x/c)^b)`
    #[default]
    Bpr,
    /// Free-flow time regardless of flow
    Constant,
    /// Greenshields linear speed-density relation
    Greenshields,
    Custom(CostFn),
}

impl CostFunction {
    pub fn function(&self) -> CostFn {
        match *self {
            CostFunction::Bpr => bpr,
            CostFunction::Constant => constant,
            CostFunction::Greenshields => greenshields,
            CostFunction::Custom(f) => f,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn cost(
        &self,
        system_optimal: bool,
        free_flow_time: f64,
        alpha: f64,
        flow: f64,
        capacity: f64,
        beta: f64,
        length: f64,
        speed_limit: f64,
    ) -> f64 {
        (self.function())(
            system_optimal,
            free_flow_time,
            alpha,
            flow,
            capacity,
            beta,
            length,
            speed_limit,
        )
    }

    /// Cost of `link` carrying `flow`, at its current (possibly throttled) capacity.
    pub fn link_cost(&self, system_optimal: bool, link: &Link, flow: f64) -> f64 {
        self.cost(
            system_optimal,
            link.free_flow_time,
            link.alpha,
            flow,
            link.capacity,
            link.beta,
            link.length,
            link.speed_limit,
        )
    }

    /// Travel time of `link` carrying `flow` at its physical max capacity.
    pub fn link_time_at_max_capacity(&self, link: &Link, flow: f64) -> f64 {
        self.cost(
            false,
            link.free_flow_time,
            link.alpha,
            flow,
            link.max_capacity,
            link.beta,
            link.length,
            link.speed_limit,
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            CostFunction::Bpr => "bpr",
            CostFunction::Constant => "constant",
            CostFunction::Greenshields => "greenshields",
            CostFunction::Custom(_) => "custom",
        }
    }
}

impl std::fmt::Display for CostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for CostFunction {
    type Err = AssignmentError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bpr" => Ok(CostFunction::Bpr),
            "constant" => Ok(CostFunction::Constant),
            "greenshields" => Ok(CostFunction::Greenshields),
            _ => Err(AssignmentError::UnknownCostFunction(s.to_string())),
        }
    }
}

//
// built-in curves
//

#[allow(clippy::too_many_arguments)]
pub fn bpr(
    system_optimal: bool,
    free_flow_time: f64,
    alpha: f64,
    flow: f64,
    capacity: f64,
    beta: f64,
    _length: f64,
    _speed_limit: f64,
) -> f64 {
    if capacity < MIN_CAPACITY {
        return INFINITE_COST;
    }
    let congestion = alpha * (flow / capacity).powf(beta);
    if system_optimal {
        free_flow_time * (1.0 + congestion * (beta + 1.0))
    } else {
        free_flow_time * (1.0 + congestion)
    }
}

#[allow(clippy::too_many_arguments)]
pub fn constant(
    _system_optimal: bool,
    free_flow_time: f64,
    _alpha: f64,
    _flow: f64,
    _capacity: f64,
    _beta: f64,
    _length: f64,
    _speed_limit: f64,
) -> f64 {
    free_flow_time
}

///
/// Greenshields: speed falls linearly with density, so the travel time is
/// `l / (v (1 - x/c))` and the marginal cost is `l c^2 / (v (c - x)^2)`.
/// Saturated or closed links get [`INFINITE_COST`].
///
#[allow(clippy::too_many_arguments)]
pub fn greenshields(
    system_optimal: bool,
    _free_flow_time: f64,
    _alpha: f64,
    flow: f64,
    capacity: f64,
    _beta: f64,
    length: f64,
    speed_limit: f64,
) -> f64 {
    if capacity < MIN_CAPACITY || flow >= capacity || speed_limit <= 0.0 {
        return INFINITE_COST;
    }
    if system_optimal {
        length * capacity * capacity / (speed_limit * (capacity - flow).powi(2))
    } else {
        length / (speed_limit * (1.0 - flow / capacity))
    }
}

//
// tests
//
