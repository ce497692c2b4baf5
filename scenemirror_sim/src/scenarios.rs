//! Simulation scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// Registration followed by pose updates only
    Steady,

    /// Pose updates interleaved with removals and activation toggles
    Churn,

    /// Objects handed between the world anchors of different clients
    Handoff,

    /// A second mirror bootstrapped from a mid-run snapshot
    Sync,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Steady,
            ScenarioId::Churn,
            ScenarioId::Handoff,
            ScenarioId::Sync,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "steady",
            ScenarioId::Churn => "churn",
            ScenarioId::Handoff => "handoff",
            ScenarioId::Sync => "sync",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "Clients register content then stream jittered poses",
            ScenarioId::Churn => "Poses plus object/frame removals and deactivate/activate toggles",
            ScenarioId::Handoff => "Objects reparented between world anchors of other clients",
            ScenarioId::Sync => "Mid-run snapshot imported into a fresh mirror that must stay identical",
        }
    }

    /// True if the scenario removes entities, so distance queries may miss.
    pub fn removes_entities(&self) -> bool {
        matches!(self, ScenarioId::Churn)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady" => Ok(ScenarioId::Steady),
            "churn" => Ok(ScenarioId::Churn),
            "handoff" | "hand_off" => Ok(ScenarioId::Handoff),
            "sync" | "snapshot" => Ok(ScenarioId::Sync),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("SNAPSHOT".parse::<ScenarioId>(), Ok(ScenarioId::Sync));
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
