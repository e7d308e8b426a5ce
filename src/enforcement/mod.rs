pub mod coordinator;
pub mod evaluator;

pub use coordinator::{CooldownConfig, InterventionCoordinator, InterventionOutcome};
pub use evaluator::{QuotaEvaluator, QuotaStatus};
