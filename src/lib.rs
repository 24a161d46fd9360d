//! chirpnet - kinetic Monte Carlo simulation of a growing follower graph
//! and the messages propagating across it

pub mod core;
pub mod network;
pub mod sampling;
pub mod simulation;
pub mod tweets;
