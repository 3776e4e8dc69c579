pub mod clock;
pub mod command;
pub mod compliance;
pub mod config;
pub mod operators;
pub mod roles;
pub mod scheduler;
pub mod token;

// Re-export the main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{AccessIntent, Command, Resource};
pub use compliance::{AllowList, EligibilityGate, Unrestricted};
pub use config::TokenConfig;
pub use operators::OperatorRegistry;
pub use roles::{Role, RoleCheck, RoleTable};
pub use scheduler::{plan_batches, BasicConflictChecker, ConflictChecker, ConflictResult, Submission};
pub use token::{Document, SecurityToken};
