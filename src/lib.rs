//!
//! trafficflow computes static [traffic assignment](https://en.wikipedia.org/wiki/Route_assignment)
//! on a road network: user equilibrium, system optimum, or a system optimum constrained
//! by a user-equilibrium baseline, with the Frank-Wolfe or successive averages method.
//!
pub mod assignment;
pub mod error;
pub mod io;

pub use error::{AssignmentError, Result};
