//! Session-scoped result stores for Varlens.
//!
//! Holds the per-domain result caches (screening, phenotype, literature),
//! resets them when the active session changes, and coordinates at-most-one
//! load per store per session against the analysis backend.

pub mod backend;
pub mod error;
pub mod orchestrator;
pub mod redirect;
pub mod session;
pub mod store;
pub mod workspace;

pub use backend::{HttpResultsBackend, ResultsBackend};
pub use error::LoadError;
pub use orchestrator::{DataLoadOrchestrator, OrchestrationReport};
pub use redirect::{schedule_redirect, RedirectHandle, RedirectOutcome};
pub use session::{ResettableStore, SessionChange, SessionMonitor, SessionSource};
pub use store::{LoadOutcome, ResultStore, StoreSnapshot};
pub use workspace::AnalysisWorkspace;
