//! Implementations of VM allocation policies.

pub mod best_fit;
pub mod first_fit;
pub mod round_robin;
pub mod worst_fit;
