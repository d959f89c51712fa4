//! Category and proposition names the backend uses in attribute bags.

pub const RESULTS: &str = "Model Checking Results";
pub const ATOMIC_PROPOSITIONS: &str = "Atomic Propositions";
pub const VARIABLES: &str = "Variable Values";
pub const REWARDS: &str = "Rewards";
pub const SCHEDULER: &str = "Scheduler";
pub const METADATA: &str = "metadata";

pub const AP_INIT: &str = "init";
pub const AP_DEADLOCK: &str = "deadlock";
pub const AP_END: &str = "finished";

pub const STATUS_READY: &str = "ready";
