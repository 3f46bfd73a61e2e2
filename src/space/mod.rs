//! Parameter space: typed values, tagged domains, and the registry
//!
//! Every tunable of the trading strategy (indicator periods, thresholds,
//! component weights, risk settings) is declared once in a [`SearchSpace`]
//! with an explicit [`ParamDomain`]. Validation and density fitting branch
//! on the domain tag; nothing is duck-typed.
//!
//! Domains are immutable once a study starts: the study owns its own clone
//! of the space, so later registry edits cannot leak into a running search.

mod domain;
mod registry;
mod value;


pub use domain::ParamDomain;
pub use registry::{SearchSpace, SpaceError};
pub use value::{ParamValue, ParameterSet};

/// Result type for space operations
pub type Result<T> = std::result::Result<T, SpaceError>;
