//! The kinetic Monte Carlo loop and its collaborators

pub mod kmc;
pub mod output;
pub mod rates;
pub mod snapshot;

pub use kmc::{AbortFlag, SimStats, Simulation, StopReason};
pub use rates::{EventClass, EventRates, RateFunction};
