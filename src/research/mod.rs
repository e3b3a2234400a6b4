//! Research orchestration engine
//!
//! Takes a topic, splits it into typed subtasks, runs them under bounded
//! concurrency against search and LLM collaborators, and merges the partial
//! results into one credibility-ranked synthesis within a wall-clock budget.
//!
//! # Architecture
//!
//! - [`planner::TaskPlanner`] - topic + focus areas -> typed tasks
//! - [`confidence::ConfidenceTracker`] - per-task early-stop decisions
//! - [`budget::AdaptiveBudgetSelector`] - execution profile per analysis call
//! - [`subagent::Subagent`] - search, prioritise and analyse for one task
//! - [`coordinator::ConcurrencyCoordinator`] - bounded fan-out with failure isolation
//! - [`synthesizer::ResultSynthesizer`] - merge, dedup, rank, narrate
//! - [`driver::OrchestrationDriver`] - run state machine and mode selection
//!
//! # Usage
//!
//! ```ignore
//! use deepdive::research::{OrchestrationDriver, RunRequest};
//! use deepdive::types::ResearchDepth;
//!
//! let driver = OrchestrationDriver::from_config(&config)?;
//! let result = driver
//!     .run_research(
//!         RunRequest::new("Acme Corp")
//!             .depth(ResearchDepth::Standard)
//!             .focus(["earnings", "sentiment"])
//!             .time_budget(120.0),
//!     )
//!     .await;
//!
//! println!("{:?}: {:.2}", result.status, result.findings.confidence_score);
//! ```

/// Adaptive execution profiles, phase allocation and deadlines.
pub mod budget;
/// Sequential-sampling confidence tracking.
pub mod confidence;
/// Bounded, failure-isolated task execution.
pub mod coordinator;
/// Run state machine.
pub mod driver;
/// Persona -> focus area lookup.
pub mod personas;
/// Task planning.
pub mod planner;
/// Per-task-type research units.
pub mod subagent;
/// Result merging.
pub mod synthesizer;

pub use budget::{AdaptiveBudgetSelector, BudgetConfig, Deadline, ExecutionProfile, PhaseAllocation};
pub use confidence::{ConfidenceThresholds, ConfidenceTracker, SmoothingPolicy, TerminationReason};
pub use coordinator::{ConcurrencyCoordinator, TaskCoordinator};
pub use driver::{
    ExecutionMode, OrchestrationDriver, ResearchConfig, RunPhase, RunRequest, RunResult, RunStatus,
};
pub use personas::{Persona, PersonaCatalog, PersonaConfig};
pub use planner::TaskPlanner;
pub use subagent::{Capabilities, SpecializedSubagent, Subagent, SubagentRegistry, SubagentSettings};
pub use synthesizer::{ResultSynthesizer, SynthesisConfig};
