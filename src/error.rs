//!
//! Error type shared by the assignment engine and the table importers.
//!
use thiserror::Error;

/// Errors raised while building a network or running an assignment
#[derive(Debug, Error)]
pub enum AssignmentError {
    /// Algorithm selector is neither FW nor MSA
    #[error("unknown assignment algorithm: {0} (expected FW or MSA)")]
    UnknownAlgorithm(String),

    /// Cost function selector is not one of the built-in curves
    #[error("unknown cost function: {0} (expected bpr, constant or greenshields)")]
    UnknownCostFunction(String),

    /// The directional derivative does not change sign in the expected direction on [low, high]
    #[error("step size root is not bracketed: d({low})={d_low:.6e}, d({high})={d_high:.6e}")]
    RootNotBracketed {
        low: f64,
        high: f64,
        d_low: f64,
        d_high: f64,
    },

    /// A demand or baseline row references a node that is not in the network
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// A baseline row references a link that is not in the network
    #[error("unknown link: {init} -> {term}")]
    UnknownLink { init: String, term: String },

    /// Constrained run without a UE baseline bound for some OD pair
    #[error("constrained assignment requires a UE baseline time for OD {origin} -> {destination}")]
    MissingBaseline { origin: String, destination: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, AssignmentError>;
