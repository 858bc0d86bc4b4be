//! Human-readable terminal output.
pub mod table;
