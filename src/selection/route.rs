use log::debug;
use serde::Serialize;

use super::Route;
use crate::error::{PlanError, PlanResult};
use crate::evidence::{refs, CitesEvidence, Citation};
use crate::patient::{PatientProfile, Ryr1Status};

/// One clinical or genetic factor contributing to a route's assessment.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteFactor {
    pub factor: String,
    pub impact: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteFeasibility {
    pub route: Route,
    pub feasible: bool,
    pub factors: Vec<RouteFactor>,
}

/// Route choice plus the full feasibility assessment of both candidate
/// routes. Neither route is ever omitted, even when infeasible.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteDecision {
    pub chosen: Route,
    pub reason: String,
    pub feasibility: Vec<RouteFeasibility>,
}

impl RouteDecision {
    pub fn feasibility_of(&self, route: Route) -> &RouteFeasibility {
        self.feasibility
            .iter()
            .find(|f| f.route == route)
            .expect("both routes are always assessed")
    }
}

impl CitesEvidence for RouteDecision {
    fn collect_citations(&self, out: &mut Vec<Citation>) {
        for assessment in &self.feasibility {
            for factor in &assessment.factors {
                out.extend(factor.citations.iter().copied());
            }
        }
    }
}

/// Assess both routes against the profile's contraindications and
/// preferences. Contraindications flip `feasible`; preferences only
/// annotate.
pub fn assess_route_feasibility(profile: &PatientProfile) -> Vec<RouteFeasibility> {
    let mut iv = RouteFeasibility {
        route: Route::Intravenous,
        feasible: true,
        factors: Vec::new(),
    };
    let mut inhalation = RouteFeasibility {
        route: Route::Inhalation,
        feasible: true,
        factors: Vec::new(),
    };

    // RYR1 pathogenic variant: absolute contraindication for volatiles.
    if profile.ryr1_variant == Ryr1Status::Variant {
        inhalation.feasible = false;
        inhalation.factors.push(RouteFactor {
            factor: "RYR1 variant".to_string(),
            impact: "Absolute contraindication (malignant hyperthermia susceptibility)".to_string(),
            citations: vec![refs::RYR1_MH],
        });
        iv.factors.push(RouteFactor {
            factor: "RYR1 variant".to_string(),
            impact: "Mandates IV route".to_string(),
            citations: vec![refs::MHAUS_GUIDELINES],
        });
    }

    // Cardiovascular disease: preference for IV titratability, not a
    // contraindication for inhalation.
    if profile.cardiovascular_disease || profile.heart_failure {
        iv.factors.push(RouteFactor {
            factor: "Cardiovascular disease".to_string(),
            impact: "Better hemodynamic control".to_string(),
            citations: vec![refs::IV_TITRATABLE],
        });
        inhalation.factors.push(RouteFactor {
            factor: "Cardiovascular disease".to_string(),
            impact: "Requires careful titration".to_string(),
            citations: vec![refs::IV_TITRATABLE],
        });
    }

    if profile.asa_class >= 4 {
        iv.factors.push(RouteFactor {
            factor: format!("ASA {}", profile.asa_class),
            impact: "Preferred for critical patients".to_string(),
            citations: vec![refs::ASA_PRACTICE],
        });
    }

    // Reserved pediatric rule: profile validation binds age to 18-95, so
    // this annotation cannot fire in the current deployment band.
    if profile.age < 12 {
        inhalation.factors.push(RouteFactor {
            factor: "Pediatric patient".to_string(),
            impact: "Often preferred in children".to_string(),
            citations: vec![refs::PEDIATRIC_INHALATION],
        });
    }

    vec![iv, inhalation]
}

/// Select the induction route for an adult profile.
pub fn select_route(profile: &PatientProfile) -> PlanResult<RouteDecision> {
    let feasibility = assess_route_feasibility(profile);
    let iv_feasible = feasibility[0].feasible;
    let inhalation_feasible = feasibility[1].feasible;
    debug!(
        "route feasibility: IV={} Inhalation={}",
        iv_feasible, inhalation_feasible
    );

    let (chosen, reason) = if !iv_feasible && !inhalation_feasible {
        return Err(PlanError::Contraindication {
            route: "any",
            detail: "both induction routes are contraindicated".to_string(),
        });
    } else if !inhalation_feasible {
        (
            Route::Intravenous,
            "Inhalation contraindicated".to_string(),
        )
    } else if !iv_feasible {
        (Route::Inhalation, "IV contraindicated".to_string())
    } else if profile.age < 12 {
        // Reserved pediatric preference, unreachable in the 18-95 band.
        (Route::Inhalation, "Pediatric preference".to_string())
    } else if profile.asa_class >= 4 {
        (
            Route::Intravenous,
            "IV strongly preferred for ASA 4+ - critical patient requires precise control"
                .to_string(),
        )
    } else if profile.heart_failure {
        (
            Route::Intravenous,
            "IV strongly preferred for heart failure - titratable hemodynamic control essential"
                .to_string(),
        )
    } else if profile.cardiovascular_disease {
        (
            Route::Intravenous,
            "IV preferred for cardiovascular disease - better hemodynamic stability".to_string(),
        )
    } else if profile.asa_class == 3 {
        (
            Route::Intravenous,
            "IV preferred for ASA 3 - better control for significant disease".to_string(),
        )
    } else {
        (Route::Intravenous, "Standard adult practice".to_string())
    };

    Ok(RouteDecision {
        chosen,
        reason,
        feasibility,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::fixtures::{minimal_profile, minimal_record};
    use crate::patient::PatientProfile;

    #[test]
    fn test_healthy_adult_defaults_to_iv() {
        let decision = select_route(&minimal_profile()).unwrap();
        assert_eq!(decision.chosen, Route::Intravenous);
        assert_eq!(decision.reason, "Standard adult practice");
    }

    #[test]
    fn test_both_routes_always_assessed() {
        let decision = select_route(&minimal_profile()).unwrap();
        assert_eq!(decision.feasibility.len(), 2);
        assert!(decision.feasibility_of(Route::Intravenous).feasible);
        assert!(decision.feasibility_of(Route::Inhalation).feasible);
    }

    #[test]
    fn test_ryr1_variant_excludes_inhalation() {
        let mut record = minimal_record();
        record.ryr1_variant = crate::patient::Ryr1Status::Variant;
        let profile = PatientProfile::from_record(&record).unwrap();

        let decision = select_route(&profile).unwrap();
        assert_eq!(decision.chosen, Route::Intravenous);
        assert_eq!(decision.reason, "Inhalation contraindicated");

        let inhalation = decision.feasibility_of(Route::Inhalation);
        assert!(!inhalation.feasible);
        assert!(inhalation.factors.iter().any(|f| f.factor == "RYR1 variant"));

        // The infeasible route is still present in the assessment.
        let iv = decision.feasibility_of(Route::Intravenous);
        assert!(iv.factors.iter().any(|f| f.impact == "Mandates IV route"));
    }

    #[test]
    fn test_heart_failure_reason_is_graded() {
        let mut record = minimal_record();
        record.heart_failure = true;
        let profile = PatientProfile::from_record(&record).unwrap();

        // Heart failure derives ASA 4, which outranks the heart failure
        // wording in the graded reason ladder.
        let decision = select_route(&profile).unwrap();
        assert_eq!(decision.chosen, Route::Intravenous);
        assert!(decision.reason.contains("ASA 4+"));
    }

    #[test]
    fn test_cardiovascular_disease_annotates_both_routes() {
        let mut record = minimal_record();
        record.cardiovascular_disease = true;
        let profile = PatientProfile::from_record(&record).unwrap();

        let decision = select_route(&profile).unwrap();
        assert_eq!(decision.chosen, Route::Intravenous);
        assert!(decision.reason.contains("cardiovascular disease"));
        assert!(!decision
            .feasibility_of(Route::Intravenous)
            .factors
            .is_empty());
        assert!(!decision
            .feasibility_of(Route::Inhalation)
            .factors
            .is_empty());
        assert!(decision.feasibility_of(Route::Inhalation).feasible);
    }
}
