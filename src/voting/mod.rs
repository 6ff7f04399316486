//! Voting Engine: polls the connected clock sources each round, tracks their
//! health and publishes a weighted-average system time.
pub mod engine;
pub mod estimate;
pub mod health;
pub mod scheduler;

pub use engine::{RoundOutcome, VotingEngine};
pub use estimate::{weighted_estimate, SystemEstimate};
pub use health::{is_valid_weight, FailureOutcome, NodeHealth, DEFAULT_WEIGHT, MAX_WEIGHT, MIN_WEIGHT};
pub use scheduler::spawn_round_driver;
