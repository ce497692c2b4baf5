//! SceneMirror Simulation Harness
//!
//! Deterministic, seed-driven runs of simulated AR clients against a
//! [`SceneGraph`](scenemirror_core::SceneGraph).
//!
//! Every source of randomness is derived from a single 64-bit seed, so a
//! failing run can be replayed exactly:
//! - **Clients**: one ChaCha8 stream per client, Gaussian pose jitter
//! - **Scenarios**: one stream for scenario-level choices such as handoffs
//!
//! After each run the [`Oracle`] re-derives every world matrix from the
//! parent chain and checks link symmetry, acyclicity and snapshot
//! round-trips.
//!
//! # Usage
//!
//! ```ignore
//! use scenemirror_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 4)
//!     .with_ticks(200)
//!     .run(ScenarioId::Churn);
//! assert!(result.passed);
//! ```

mod client;
mod error;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;
mod update;

pub use client::{ClientLayout, SimClient};
pub use error::SimError;
pub use exporter::MirrorExport;
pub use oracle::Oracle;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use update::SpatialUpdate;
