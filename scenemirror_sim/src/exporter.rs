//! JSON exporter for finished runs.
//!
//! Writes the final mirror snapshot together with the run summary, so a run
//! can be inspected offline or fed back into another graph with
//! `import_snapshot_json`.

use crate::error::SimError;
use crate::runner::{ScenarioMetrics, ScenarioResult};

use scenemirror_core::{GraphError, GraphStats, SceneGraph, Snapshot};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Complete export of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Ticks executed
    pub ticks: u64,

    /// Final result
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub stats: GraphStats,

    pub metrics: ScenarioMetrics,

    /// Final graph state
    pub snapshot: Snapshot,
}

impl MirrorExport {
    /// Captures a finished run and the graph it produced.
    pub fn new(result: &ScenarioResult, graph: &mut SceneGraph) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            ticks: result.total_ticks,
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
            stats: result.stats,
            metrics: result.metrics.clone(),
            snapshot: graph.export_snapshot(),
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self).map_err(GraphError::encode)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
