//! Run engine: product selection, summary caching and the end-to-end run
//! orchestration over the store seams in `cosme-db`.

pub mod collaborators;
pub mod ingest;
pub mod lock;
pub mod orchestrator;
pub mod selector;
pub mod summary_cache;

#[cfg(test)]
pub(crate) mod fakes;

pub use collaborators::{
    CollaboratorError, MediaArtifact, Notifier, Renderer, Scraper, Summarizer, Uploader,
};
pub use ingest::{ingest_ranking, IngestError, IngestReport};
pub use lock::{RunGuard, RunLocks};
pub use orchestrator::{
    Collaborators, FailureKind, Orchestrator, OrchestratorError, OrchestratorSettings,
    PreviewError, PreviewReport, RunNotice, RunOutcome, RunPhase, RunReport, Stores,
};
pub use selector::{SelectError, Selector};
pub use summary_cache::{SummaryCache, SummaryCacheError};
