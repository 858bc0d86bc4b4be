//! Convergence operations: every call runs under a bounded retry policy and
//! returns either its result or the error of the final attempt.
pub mod cloud_config;
pub mod nodegroup;
pub mod nodes;
