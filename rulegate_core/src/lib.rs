pub mod coerce;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod loader;
pub mod operators;
pub mod policy;
pub mod resolver;
pub mod sequence;
pub mod value;

pub use config::EngineConfig;
pub use enforcer::PolicyEnforcer;
pub use error::{PolicyError, Result};
pub use loader::{load_policies, load_policy, load_policy_dir};
pub use operators::{Builtin, Operator, OperatorRegistry};
pub use policy::{Denial, DenialReason, Evaluation, Policy, Rule, RuleValue};
pub use resolver::resolve;
pub use sequence::SequenceComparator;
pub use value::{to_value, Object, Value, Visibility};
