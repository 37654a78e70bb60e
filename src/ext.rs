//! Extension contracts filled in by callers: the opaque provider call and the
//! optional fallback estimator used for graceful degradation.

pub mod executor;
pub mod fallback;

pub use executor::*;
pub use fallback::*;
