use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::dose::{self, DosePlan};
use crate::error::PlanResult;
use crate::evidence::{self, CitesEvidence, EvidenceSummary};
use crate::patient::{
    AlcoholUse, Gender, Metabolizer, PatientProfile, Ryr1Status, SmokingStatus, Ugt1a9Activity,
};
use crate::risk::{self, CurvePoint, RiskResult};
use crate::selection::{self, AgentSelection, RouteDecision};

/// Caller knobs for a single plan computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    pub include_curve_samples: bool,
}

/// Echo of the inputs the plan was computed from.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PatientSummary {
    pub age: u32,
    pub gender: Gender,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub bmi: f64,
    pub asa_class: u8,
    pub asa_reason: String,
    pub smoking_status: SmokingStatus,
    pub alcohol_use: AlcoholUse,
    pub procedure_duration_min: u32,
    pub neuromonitoring: bool,
    pub pk_genetics: PkGeneticsSummary,
    pub pd_genetics: PdGeneticsSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PkGeneticsSummary {
    pub ryr1_variant: Ryr1Status,
    pub cyp2b6: Metabolizer,
    pub cyp3a4: Metabolizer,
    pub cyp2c9: Metabolizer,
    pub ugt1a9: Ugt1a9Activity,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PdGeneticsSummary {
    pub gabra1: String,
    pub comt: String,
    pub oprm1: String,
    pub cacna1c: String,
}

/// Complete induction plan. Pure output of `compute_plan`; the timestamp
/// is the only field excluded from idempotence comparisons.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub timestamp: DateTime<Utc>,
    pub patient: PatientSummary,
    pub route: RouteDecision,
    pub agent: AgentSelection,
    pub dose: DosePlan,
    pub risk: RiskResult,
    pub evidence: EvidenceSummary,
    pub curve_samples: Option<Vec<CurvePoint>>,
}

fn summarize_patient(profile: &PatientProfile) -> PatientSummary {
    PatientSummary {
        age: profile.age,
        gender: profile.gender,
        weight_kg: profile.weight_kg,
        height_cm: profile.height_cm,
        bmi: profile.bmi(),
        asa_class: profile.asa_class,
        asa_reason: profile.asa_reason.clone(),
        smoking_status: profile.smoking_status,
        alcohol_use: profile.alcohol_use,
        procedure_duration_min: profile.procedure_duration_min,
        neuromonitoring: profile.neuromonitoring,
        pk_genetics: PkGeneticsSummary {
            ryr1_variant: profile.ryr1_variant,
            cyp2b6: profile.cyp2b6,
            cyp3a4: profile.cyp3a4,
            cyp2c9: profile.cyp2c9,
            ugt1a9: profile.ugt1a9,
        },
        pd_genetics: PdGeneticsSummary {
            gabra1: profile.gabra1.clone(),
            comt: profile.comt.clone(),
            oprm1: profile.oprm1.clone(),
            cacna1c: profile.cacna1c.clone(),
        },
    }
}

/// Run the full pipeline over one profile: route, agent, dose, risk, then
/// evidence aggregation. Every stage runs in strict sequence; nothing is
/// skipped.
pub fn compute_plan(profile: &PatientProfile, options: &PlanOptions) -> PlanResult<Plan> {
    // Defensive: the profile normally arrives validated, but the pipeline
    // does not trust its caller.
    profile.validate()?;
    info!(
        "computing plan: age {}, ASA {}, {:.1} kg",
        profile.age, profile.asa_class, profile.weight_kg
    );

    let route = selection::select_route(profile)?;
    info!("route: {} ({})", route.chosen, route.reason);

    let agent = selection::select_agent(profile, route.chosen)?;
    info!("agent: {} (score {:.1})", agent.chosen, agent.score);

    let dose = dose::calculate_dose(profile, agent.chosen, route.chosen)?;
    let risk = risk::predict_risk(profile, &dose)?;

    let evidence =
        evidence::aggregate(&[&route as &dyn CitesEvidence, &agent, &dose, &risk]);
    info!(
        "evidence: {} deduplicated sources",
        evidence.total_sources
    );

    let curve_samples = if options.include_curve_samples {
        match &dose {
            DosePlan::Bolus(bolus) => {
                Some(risk::dose_response_curve(profile, bolus)?.collect())
            }
            // Curve rendering targets bolus dosing; MAC targets ship
            // without a sweep.
            DosePlan::Volatile(_) => None,
        }
    } else {
        None
    };

    Ok(Plan {
        timestamp: Utc::now(),
        patient: summarize_patient(profile),
        route,
        agent,
        dose,
        risk,
        evidence,
        curve_samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use crate::patient::fixtures::{minimal_profile, minimal_record};
    use crate::risk::CURVE_SAMPLE_COUNT;
    use crate::selection::{Agent, Route};
    use approx::assert_relative_eq;

    #[test]
    fn test_minimal_profile_end_to_end() {
        let plan = compute_plan(&minimal_profile(), &PlanOptions::default()).unwrap();

        assert_eq!(plan.route.chosen, Route::Intravenous);
        assert_eq!(plan.agent.chosen, Agent::Propofol);
        match &plan.dose {
            DosePlan::Bolus(dose) => {
                assert_relative_eq!(dose.final_dose_mg, 140.0, epsilon = 1e-9)
            }
            DosePlan::Volatile(_) => panic!("expected bolus dose"),
        }
        assert!(plan.risk.therapeutic_index > 1.0);
        assert!(plan.evidence.total_sources > 0);
        assert!(plan.curve_samples.is_none());
    }

    #[test]
    fn test_curve_samples_attached_on_request() {
        let options = PlanOptions {
            include_curve_samples: true,
        };
        let plan = compute_plan(&minimal_profile(), &options).unwrap();
        let samples = plan.curve_samples.expect("curve samples requested");
        assert_eq!(samples.len(), CURVE_SAMPLE_COUNT);
    }

    #[test]
    fn test_idempotent_apart_from_timestamp() {
        let profile = minimal_profile();
        let options = PlanOptions {
            include_curve_samples: true,
        };
        let first = compute_plan(&profile, &options).unwrap();
        let second = compute_plan(&profile, &options).unwrap();

        assert_eq!(first.patient, second.patient);
        assert_eq!(first.route, second.route);
        assert_eq!(first.agent, second.agent);
        assert_eq!(first.dose, second.dose);
        assert_eq!(first.risk, second.risk);
        assert_eq!(first.evidence, second.evidence);
        assert_eq!(first.curve_samples, second.curve_samples);
    }

    #[test]
    fn test_invalid_profile_rejected_defensively() {
        let mut profile = minimal_profile();
        // Simulate a caller bypassing construction.
        profile.age = 5;
        profile.gabra1 = "bogus".to_string();

        let err = compute_plan(&profile, &PlanOptions::default()).unwrap_err();
        match err {
            PlanError::Validation(fields) => {
                let names: Vec<_> = fields.iter().map(|f| f.field).collect();
                assert_eq!(names, vec!["age", "gabra1"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_ryr1_variant_scenario() {
        let mut record = minimal_record();
        record.ryr1_variant = crate::patient::Ryr1Status::Variant;
        let profile = crate::patient::PatientProfile::from_record(&record).unwrap();

        let plan = compute_plan(&profile, &PlanOptions::default()).unwrap();
        assert_eq!(plan.route.chosen, Route::Intravenous);
        assert!(!plan.route.feasibility_of(Route::Inhalation).feasible);
        assert_eq!(plan.agent.chosen, Agent::Propofol);
    }

    #[test]
    fn test_evidence_spans_all_three_categories() {
        let mut record = minimal_record();
        record.cyp2b6 = crate::patient::Metabolizer::Pm;
        let profile = crate::patient::PatientProfile::from_record(&record).unwrap();

        let plan = compute_plan(&profile, &PlanOptions::default()).unwrap();
        assert!(plan.evidence.pharmacokinetics > 0);
        assert!(plan.evidence.pharmacodynamics > 0);
        assert!(plan.evidence.clinical_guidelines > 0);
        assert_eq!(
            plan.evidence.total_sources,
            plan.evidence.pharmacokinetics
                + plan.evidence.pharmacodynamics
                + plan.evidence.clinical_guidelines
        );
    }
}
