pub mod agent;
pub mod route;

pub use agent::{select_agent, AgentAssessment, AgentSelection, ScoredFactor};
pub use route::{select_route, RouteDecision, RouteFactor, RouteFeasibility};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Induction route. The candidate set is clinically fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    #[serde(rename = "IV")]
    Intravenous,
    Inhalation,
}

impl Route {
    pub fn label(self) -> &'static str {
        match self {
            Route::Intravenous => "IV",
            Route::Inhalation => "Inhalation",
        }
    }

    /// Candidate agents for this route, in fixed priority order. The order
    /// doubles as the final tie-break during selection.
    pub fn candidates(self) -> &'static [Agent] {
        match self {
            Route::Intravenous => &[Agent::Propofol, Agent::Etomidate, Agent::Ketamine],
            Route::Inhalation => &[Agent::Sevoflurane, Agent::Desflurane, Agent::Isoflurane],
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Induction agent. Closed set; exhaustive matches keep the dose and risk
/// tables honest when an agent is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Agent {
    Propofol,
    Etomidate,
    Ketamine,
    Sevoflurane,
    Desflurane,
    Isoflurane,
}

impl Agent {
    pub fn name(self) -> &'static str {
        match self {
            Agent::Propofol => "Propofol",
            Agent::Etomidate => "Etomidate",
            Agent::Ketamine => "Ketamine",
            Agent::Sevoflurane => "Sevoflurane",
            Agent::Desflurane => "Desflurane",
            Agent::Isoflurane => "Isoflurane",
        }
    }

    pub fn route(self) -> Route {
        match self {
            Agent::Propofol | Agent::Etomidate | Agent::Ketamine => Route::Intravenous,
            Agent::Sevoflurane | Agent::Desflurane | Agent::Isoflurane => Route::Inhalation,
        }
    }

    pub fn is_volatile(self) -> bool {
        self.route() == Route::Inhalation
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_candidates_are_route_scoped() {
        for route in [Route::Intravenous, Route::Inhalation] {
            assert_eq!(route.candidates().len(), 3);
            for agent in route.candidates() {
                assert_eq!(agent.route(), route);
            }
        }
    }

    #[test]
    fn test_route_wire_format() {
        assert_eq!(serde_json::to_string(&Route::Intravenous).unwrap(), "\"IV\"");
        assert_eq!(
            serde_json::to_string(&Route::Inhalation).unwrap(),
            "\"Inhalation\""
        );
    }
}
