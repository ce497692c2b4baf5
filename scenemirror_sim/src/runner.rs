//! Scenario runner - drives simulated clients against a mirror graph.

use crate::client::{ClientLayout, SimClient};
use crate::error::SimError;
use crate::oracle::Oracle;
use crate::scenarios::ScenarioId;
use crate::update::SpatialUpdate;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use scenemirror_core::{GraphConfig, GraphStats, SceneGraph, ROOT_ID};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Chance per client per tick of a handoff in scenarios that hand off.
const HANDOFF_PROBABILITY: f64 = 0.2;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Number of active entities at end
    pub final_entity_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Graph statistics at end
    pub stats: GraphStats,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Updates produced by clients
    pub updates_sent: u64,

    /// Updates the graph acted on
    pub updates_applied: u64,

    /// Mutation observer invocations
    pub notifications: u64,

    /// Successful reparents under a world anchor
    pub handoffs: u64,

    /// Distance queries issued
    pub distance_queries: u64,

    /// Distance queries that hit an unknown entity
    pub unresolved_distances: u64,

    /// Size of the last JSON snapshot
    pub snapshot_bytes: u64,

    /// Entities created by snapshot imports
    pub entities_imported: u64,
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of clients
    num_clients: usize,

    /// Ticks after registration
    ticks: u64,

    config: GraphConfig,
    layout: ClientLayout,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_clients: usize) -> Self {
        Self {
            seed,
            num_clients,
            ticks: 100,
            config: GraphConfig::default(),
            layout: ClientLayout::default(),
        }
    }

    /// Sets the number of ticks.
    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.ticks = ticks;
        self
    }

    /// Sets the graph configuration.
    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the per-client content layout.
    pub fn with_layout(mut self, layout: ClientLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_and_keep(scenario).0
    }

    /// Runs a scenario and also returns the final graph.
    pub fn run_and_keep(&self, scenario: ScenarioId) -> (ScenarioResult, SceneGraph) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut graph = SceneGraph::with_config(self.config.clone());
        let notifications = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&notifications);
        graph.on_mutation(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let mut metrics = ScenarioMetrics::default();
        let outcome = self
            .execute(scenario, &mut graph, &mut metrics)
            .and_then(|()| self.check(scenario, &mut graph, &mut metrics));
        metrics.notifications = notifications.load(Ordering::Relaxed);

        let failure_reason = match outcome {
            Ok(()) => None,
            Err(e) => {
                warn!("Scenario {} failed: {}", scenario.name(), e);
                Some(e.to_string())
            }
        };

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            total_ticks: self.ticks,
            final_entity_count: graph.active_ids().len(),
            failure_reason,
            metrics,
            stats: graph.stats(),
        };
        (result, graph)
    }

    fn client_seed(&self, id: usize) -> u64 {
        self.seed
            .wrapping_mul(0x9e3779b97f4a7c15)
            .wrapping_add(id as u64)
    }

    fn execute(
        &self,
        scenario: ScenarioId,
        graph: &mut SceneGraph,
        metrics: &mut ScenarioMetrics,
    ) -> Result<(), SimError> {
        if self.num_clients == 0 {
            return Err(SimError::config("at least one client is required"));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut clients = (0..self.num_clients)
            .map(|id| SimClient::new(id, self.client_seed(id), self.layout.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let worlds: Vec<String> = clients.iter().map(SimClient::world_name).collect();

        let churn = matches!(scenario, ScenarioId::Churn | ScenarioId::Sync);
        let handoff = matches!(scenario, ScenarioId::Handoff | ScenarioId::Sync);
        let sync_tick = self.ticks / 2;
        let mut mirror: Option<SceneGraph> = None;

        for client in clients.iter_mut() {
            let updates = client.register();
            Self::deliver(&updates, graph, None, metrics);
        }

        for tick in 0..self.ticks {
            if scenario == ScenarioId::Sync && tick == sync_tick {
                mirror = Some(self.bootstrap_mirror(graph, metrics)?);
            }

            for client in clients.iter_mut() {
                let mut updates = client.pose_updates();
                if churn {
                    updates.extend(client.churn_updates());
                }
                if handoff && rng.gen_bool(HANDOFF_PROBABILITY) {
                    updates.extend(client.handoff_update(&worlds));
                }
                Self::deliver(&updates, graph, mirror.as_mut(), metrics);
            }

            self.query_distances(&clients, graph, metrics);

            if tick % 25 == 0 {
                debug!(
                    "  tick={} | entities={} | applied={}",
                    tick,
                    graph.len(),
                    metrics.updates_applied
                );
            }
        }

        if scenario == ScenarioId::Sync {
            let mut mirror = match mirror {
                Some(mirror) => mirror,
                None => self.bootstrap_mirror(graph, metrics)?,
            };
            Self::check_mirror(graph, &mut mirror)?;
        }

        Ok(())
    }

    /// Applies updates to the primary graph and, if present, the mirror.
    fn deliver(
        updates: &[SpatialUpdate],
        graph: &mut SceneGraph,
        mut mirror: Option<&mut SceneGraph>,
        metrics: &mut ScenarioMetrics,
    ) {
        for update in updates {
            metrics.updates_sent += 1;
            if update.apply(graph) {
                metrics.updates_applied += 1;
                if matches!(update, SpatialUpdate::Reparent { .. }) {
                    metrics.handoffs += 1;
                }
            }
            if let Some(mirror) = mirror.as_deref_mut() {
                update.apply(mirror);
            }
        }
    }

    /// Distance from each client's first object to the next client's world.
    fn query_distances(&self, clients: &[SimClient], graph: &mut SceneGraph, metrics: &mut ScenarioMetrics) {
        for (i, client) in clients.iter().enumerate() {
            let Some(object) = client.object_names().next() else {
                continue;
            };
            let next = &clients[(i + 1) % clients.len()];
            let a = graph.keys().object_key(object);
            let b = graph.keys().object_key(&next.world_name());

            metrics.distance_queries += 1;
            if graph.distance_between(&a, &b) < 0.0 {
                metrics.unresolved_distances += 1;
            }
        }
    }

    /// Builds a fresh mirror from a JSON snapshot of `graph`.
    fn bootstrap_mirror(&self, graph: &mut SceneGraph, metrics: &mut ScenarioMetrics) -> Result<SceneGraph, SimError> {
        let json = graph.export_snapshot_json()?;
        metrics.snapshot_bytes = json.len() as u64;

        let mut mirror = SceneGraph::with_config(GraphConfig {
            reserved_anchors: false,
            ..self.config.clone()
        });
        let created = mirror.import_snapshot_json(&json)?;
        metrics.entities_imported += created as u64;
        info!("Mirror bootstrapped: {} entities from {} bytes", created, json.len());
        Ok(mirror)
    }

    /// The mirror saw the same updates after bootstrapping, so it must match
    /// the primary exactly. A second merge must then create nothing.
    fn check_mirror(graph: &mut SceneGraph, mirror: &mut SceneGraph) -> Result<(), SimError> {
        let primary = graph.export_snapshot();
        if mirror.export_snapshot() != primary {
            return Err(SimError::invariant("mirror diverged from primary after bootstrap"));
        }
        let created = mirror.import_snapshot(&primary);
        if created != 0 {
            return Err(SimError::invariant(format!(
                "re-merging an identical snapshot created {} entities",
                created
            )));
        }
        Oracle::new().verify(mirror)
    }

    /// Post-run assertions: oracle invariants plus scenario expectations.
    fn check(&self, scenario: ScenarioId, graph: &mut SceneGraph, metrics: &mut ScenarioMetrics) -> Result<(), SimError> {
        let oracle = Oracle::new();
        oracle.verify(graph)?;
        metrics.snapshot_bytes = oracle.verify_round_trip(graph)? as u64;

        if !scenario.removes_entities() && scenario != ScenarioId::Sync && metrics.unresolved_distances > 0 {
            return Err(SimError::invariant(format!(
                "{} distance queries unresolved without removals",
                metrics.unresolved_distances
            )));
        }

        match scenario {
            ScenarioId::Steady => {
                let inactive = graph.stats().deactivated_entities;
                if inactive > 0 {
                    return Err(SimError::invariant(format!("{} entities deactivated", inactive)));
                }
                if graph.stats().detached_entities > 0 {
                    return Err(SimError::invariant("entities detached without removals"));
                }
            }
            ScenarioId::Handoff => {
                let handed_off = graph
                    .ids()
                    .filter_map(|id| graph.get(id))
                    .filter(|node| node.id().ends_with("_world") && node.parent() == Some(ROOT_ID))
                    .any(|world| !world.children().is_empty());
                if metrics.handoffs > 0 && !handed_off {
                    return Err(SimError::invariant("handoffs reported but no world anchor has children"));
                }
            }
            ScenarioId::Churn | ScenarioId::Sync => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_scenario() {
        let runner = ScenarioRunner::new(42, 3).with_ticks(20);

        let result = runner.run(ScenarioId::Steady);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.unresolved_distances, 0);
        assert_eq!(result.metrics.distance_queries, 3 * 20);
        assert!(result.metrics.notifications > 0);
    }

    #[test]
    fn test_churn_scenario() {
        let runner = ScenarioRunner::new(7, 4).with_ticks(60);

        let result = runner.run(ScenarioId::Churn);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.updates_applied > 0);
    }

    #[test]
    fn test_handoff_scenario() {
        let runner = ScenarioRunner::new(42, 4).with_ticks(30);

        let (result, graph) = runner.run_and_keep(ScenarioId::Handoff);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.handoffs > 0);
        let stats = result.stats;
        assert_eq!(stats.reachable_entities, stats.total_entities);
        assert_eq!(stats.total_entities, graph.len());
    }

    #[test]
    fn test_sync_scenario() {
        let runner = ScenarioRunner::new(3, 3).with_ticks(40);

        let result = runner.run(ScenarioId::Sync);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.entities_imported > 0);
        assert!(result.metrics.snapshot_bytes > 0);
    }

    #[test]
    fn test_sync_without_ticks_still_bootstraps() {
        let runner = ScenarioRunner::new(3, 2).with_ticks(0);

        let result = runner.run(ScenarioId::Sync);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.entities_imported > 0);
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let runner1 = ScenarioRunner::new(42, 3).with_ticks(30);
        let runner2 = ScenarioRunner::new(42, 3).with_ticks(30);

        let (result1, mut graph1) = runner1.run_and_keep(ScenarioId::Churn);
        let (result2, mut graph2) = runner2.run_and_keep(ScenarioId::Churn);

        assert_eq!(result1.metrics, result2.metrics);
        assert_eq!(graph1.export_snapshot(), graph2.export_snapshot());
    }

    #[test]
    fn test_zero_clients_fails() {
        let result = ScenarioRunner::new(1, 0).with_ticks(5).run(ScenarioId::Steady);

        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("client"));
    }

    #[test]
    fn test_reserved_anchors_config() {
        let config = GraphConfig {
            reserved_anchors: true,
            ..Default::default()
        };
        let runner = ScenarioRunner::new(5, 2).with_ticks(10).with_config(config);

        let (result, graph) = runner.run_and_keep(ScenarioId::Sync);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(graph.contains(scenemirror_core::CAMERA_ID));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            #[test]
            fn any_seed_keeps_invariants(seed in any::<u64>(), clients in 1usize..4) {
                let result = ScenarioRunner::new(seed, clients).with_ticks(15).run(ScenarioId::Sync);
                prop_assert!(result.passed, "{:?}", result.failure_reason);
            }
        }
    }
}
