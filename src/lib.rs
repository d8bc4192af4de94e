// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod candidate;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod seen;
pub mod shutdown;
pub mod store;

// Pure analysis stages (keywords, scoring, ranking)
pub mod analyze;

// Feeds and their providers
pub mod ingest;

// Delivery channels
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::candidate::{Candidate, Exclusion, ScoredCandidate};
pub use crate::config::RadarConfig;
pub use crate::errors::{
    ConfigurationError, CycleError, DeliveryError, FailureKind, PersistenceError,
    SourceUnavailable,
};
pub use crate::ingest::types::{CandidateSource, Feed};
pub use crate::notify::{Deliverer, Message};
pub use crate::pipeline::{CycleReport, CycleStage, Pipeline, PipelineSettings, SharedPipeline};
pub use crate::scheduler::{CycleRunner, Scheduler, SchedulerSummary};
pub use crate::shutdown::{Shutdown, ShutdownTrigger};

/// Tracing setup shared by the binaries: `RUST_LOG` or `viral_radar=info,warn`,
/// compact text or JSON lines when `RADAR_LOG_JSON=1`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("viral_radar=info,warn"));
    let json = std::env::var("RADAR_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    // try_init: a second call (tests, embedding) is a no-op instead of a panic.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
