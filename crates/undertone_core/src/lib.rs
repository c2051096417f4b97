//! Undertone Core - multi-tier analysis orchestrator.
//!
//! Capability discovery, backend selection, fallback cascades,
//! confidence-driven escalation to a remote backend, sanitization before any
//! remote call, and merging of local and remote results.

pub mod backends;
pub mod cache;
pub mod capabilities;
pub mod cascade;
pub mod error;
pub mod escalation;
pub mod explain;
pub mod history;
pub mod merge;
pub mod monitor;
pub mod orchestrator;
pub mod timing;

pub use backends::{AnalysisBackend, BackendError, BackendSet};
pub use cache::{CacheKey, ResultCache};
pub use capabilities::{Capabilities, CapabilityProbe, CapabilityRegistry, EnvironmentProbe, StaticProbe};
pub use cascade::{plan_candidates, CascadeExecutor, CascadeOutcome, CascadeState};
pub use error::{OrchestratorError, OrchestratorResult};
pub use escalation::{should_escalate, EscalationDecision, EscalationPolicy, EscalationTrigger};
pub use explain::{explain, Explanation, KeyElement, Verdict};
pub use history::{HistoryEntry, HistoryStore, JsonlHistory, MemoryHistory};
pub use merge::merge;
pub use monitor::{PerformanceMonitor, PerformanceReport};
pub use orchestrator::{AnalysisReport, Orchestrator, OrchestratorBuilder};
