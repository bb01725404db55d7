pub mod decider;
pub mod jwt;
