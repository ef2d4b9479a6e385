pub mod indicators;
pub mod snapshot;

#[cfg(test)]
mod indicators_tests;

pub use indicators::*;
pub use snapshot::TechnicalSnapshot;
