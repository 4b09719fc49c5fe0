use log::{debug, warn};
use serde::Serialize;

use crate::dose::{DosePlan, DoseResult};
use crate::error::{PlanError, PlanResult};
use crate::evidence::{self, refs, AdjustmentFactor, CitesEvidence, Citation, PdTarget};
use crate::patient::PatientProfile;
use crate::selection::Agent;

/// Emax/Hill parameters for one agent. IV agents are parameterized on the
/// mg/kg scale; volatiles on the MAC-multiple scale.
pub struct ResponseSpec {
    pub agent: Agent,
    pub ec50_hypnosis: f64,
    pub ec50_adverse: f64,
    pub hill: f64,
    pub citations: &'static [Citation],
}

static RESPONSE_SPECS: &[ResponseSpec] = &[
    ResponseSpec {
        agent: Agent::Propofol,
        ec50_hypnosis: 1.8,
        ec50_adverse: 2.3,
        hill: 2.5,
        citations: &[refs::PROPOFOL_ED50, refs::TCI_EMAX_CONTEXT],
    },
    ResponseSpec {
        agent: Agent::Etomidate,
        ec50_hypnosis: 0.25,
        ec50_adverse: 0.40,
        hill: 3.0,
        citations: &[refs::ETOMIDATE_PD, refs::TCI_EMAX_CONTEXT],
    },
    ResponseSpec {
        agent: Agent::Ketamine,
        ec50_hypnosis: 1.0,
        ec50_adverse: 2.8,
        hill: 2.0,
        citations: &[refs::KETALAR_LABEL, refs::TCI_EMAX_CONTEXT],
    },
    ResponseSpec {
        agent: Agent::Sevoflurane,
        ec50_hypnosis: 0.45,
        ec50_adverse: 1.30,
        hill: 4.0,
        citations: &[refs::MAPLESON_MAC_AGE, refs::TCI_EMAX_CONTEXT],
    },
    ResponseSpec {
        agent: Agent::Desflurane,
        ec50_hypnosis: 0.45,
        ec50_adverse: 1.30,
        hill: 4.0,
        citations: &[refs::MAPLESON_MAC_AGE, refs::TCI_EMAX_CONTEXT],
    },
    ResponseSpec {
        agent: Agent::Isoflurane,
        ec50_hypnosis: 0.45,
        ec50_adverse: 1.30,
        hill: 4.0,
        citations: &[refs::MAPLESON_MAC_AGE, refs::TCI_EMAX_CONTEXT],
    },
];

pub fn response_spec(agent: Agent) -> Option<&'static ResponseSpec> {
    RESPONSE_SPECS.iter().find(|s| s.agent == agent)
}

/// Contribution of one PD marker, reported for every marker whether or not
/// it applies to the chosen agent. Factors are the effective ones (1.0
/// when the marker does not act on this agent).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PdEffect {
    pub gene: String,
    pub variant: String,
    pub effect: String,
    pub applied: bool,
    pub ec50_hypnosis_factor: f64,
    pub ec50_adverse_factor: f64,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RiskResult {
    pub agent: Agent,
    /// Dose on the agent's response scale (mg/kg or MAC multiple).
    pub dose: f64,
    pub p_hypnosis: f64,
    pub p_adverse: f64,
    /// Separation of the two response curves: adverse EC50 over hypnosis
    /// EC50 after every adjustment. Must exceed 1 for a viable window.
    pub therapeutic_index: f64,
    pub narrow_window: bool,
    pub base_ec50_hypnosis: f64,
    pub ec50_hypnosis: f64,
    pub base_ec50_adverse: f64,
    pub ec50_adverse: f64,
    pub hill: f64,
    pub pd_effects: Vec<PdEffect>,
    pub safety_adjustments: Vec<AdjustmentFactor>,
    pub citations: Vec<Citation>,
}

impl CitesEvidence for RiskResult {
    fn collect_citations(&self, out: &mut Vec<Citation>) {
        out.extend(self.citations.iter().copied());
        for effect in self.pd_effects.iter().filter(|e| e.applied) {
            out.extend(effect.citations.iter().copied());
        }
        for adjustment in &self.safety_adjustments {
            out.extend(adjustment.citations.iter().copied());
        }
    }
}

fn gene_applies(target: PdTarget, agent: Agent) -> bool {
    match target {
        PdTarget::All => true,
        PdTarget::Gabaergic => matches!(agent, Agent::Propofol | Agent::Etomidate),
        PdTarget::NmdaAntagonist => agent == Agent::Ketamine,
    }
}

/// Response-curve parameters after PD genetics and safety thresholds.
struct AdjustedResponse {
    base_ec50_hypnosis: f64,
    ec50_hypnosis: f64,
    base_ec50_adverse: f64,
    ec50_adverse: f64,
    hill: f64,
    pd_effects: Vec<PdEffect>,
    safety_adjustments: Vec<AdjustmentFactor>,
    citations: Vec<Citation>,
}

fn adjusted_response(profile: &PatientProfile, agent: Agent) -> PlanResult<AdjustedResponse> {
    let spec = response_spec(agent).ok_or_else(|| {
        PlanError::computation(format!("no response specification for agent {}", agent))
    })?;

    let mut ec50_hypnosis = spec.ec50_hypnosis;
    let mut ec50_adverse = spec.ec50_adverse;
    let mut pd_effects = Vec::new();

    let markers: [(&str, &str); 4] = [
        ("gabra1", profile.gabra1.as_str()),
        ("comt", profile.comt.as_str()),
        ("oprm1", profile.oprm1.as_str()),
        ("cacna1c", profile.cacna1c.as_str()),
    ];

    for (gene, variant) in markers {
        let entry = evidence::pd_variant(gene, variant).ok_or_else(|| {
            PlanError::computation(format!("unknown {} variant {:?}", gene, variant))
        })?;

        let applied = gene_applies(entry.target, agent);
        let (hypnosis_factor, adverse_factor) = if applied {
            (entry.ec50_hypnosis_factor, entry.ec50_adverse_factor)
        } else {
            (1.0, 1.0)
        };
        ec50_hypnosis *= hypnosis_factor;
        ec50_adverse *= adverse_factor;

        pd_effects.push(PdEffect {
            gene: gene.to_uppercase(),
            variant: variant.to_string(),
            effect: entry.effect.to_string(),
            applied,
            ec50_hypnosis_factor: hypnosis_factor,
            ec50_adverse_factor: adverse_factor,
            citations: entry.citations.to_vec(),
        });
    }

    // Vulnerable populations get a lowered adverse-event threshold rather
    // than a shifted hypnosis curve.
    let mut safety_adjustments = Vec::new();
    if profile.age >= 85 {
        safety_adjustments.push(AdjustmentFactor::new(
            "Adverse threshold lowered 25% for age >= 85",
            0.75,
            &[refs::ELDERLY_DOSE_REDUCTION],
        ));
    } else if profile.age >= 75 {
        safety_adjustments.push(AdjustmentFactor::new(
            "Adverse threshold lowered 15% for age >= 75",
            0.85,
            &[refs::ELDERLY_DOSE_REDUCTION],
        ));
    }
    if profile.heart_failure {
        safety_adjustments.push(AdjustmentFactor::new(
            "Adverse threshold lowered 20% for heart failure",
            0.80,
            &[refs::ASA_PRACTICE],
        ));
    } else if profile.cardiovascular_disease && profile.asa_class >= 4 {
        safety_adjustments.push(AdjustmentFactor::new(
            "Adverse threshold lowered 15% for critical cardiovascular disease",
            0.85,
            &[refs::ASA_PRACTICE],
        ));
    }
    if profile.asa_class >= 5 {
        safety_adjustments.push(AdjustmentFactor::new(
            "Adverse threshold lowered 30% for ASA 5",
            0.70,
            &[refs::ASA_CLASSIFICATION],
        ));
    } else if profile.asa_class == 4 {
        safety_adjustments.push(AdjustmentFactor::new(
            "Adverse threshold lowered 15% for ASA 4",
            0.85,
            &[refs::ASA_CLASSIFICATION],
        ));
    }
    for adjustment in &safety_adjustments {
        ec50_adverse *= adjustment.multiplier;
    }

    if !(ec50_hypnosis.is_finite() && ec50_adverse.is_finite())
        || ec50_hypnosis <= 0.0
        || ec50_adverse <= 0.0
    {
        return Err(PlanError::computation(format!(
            "EC50 adjustment chain for {} produced hypnosis {} / adverse {}",
            agent, ec50_hypnosis, ec50_adverse
        )));
    }

    Ok(AdjustedResponse {
        base_ec50_hypnosis: spec.ec50_hypnosis,
        ec50_hypnosis,
        base_ec50_adverse: spec.ec50_adverse,
        ec50_adverse,
        hill: spec.hill,
        pd_effects,
        safety_adjustments,
        citations: spec.citations.to_vec(),
    })
}

/// Hill response: d^n / (EC50^n + d^n), clamped to [0, 1].
fn hill_probability(dose: f64, ec50: f64, hill: f64) -> f64 {
    if dose <= 0.0 {
        return 0.0;
    }
    let dn = dose.powf(hill);
    (dn / (ec50.powf(hill) + dn)).clamp(0.0, 1.0)
}

/// Predict hypnosis and adverse-event probabilities at the computed dose.
pub fn predict_risk(profile: &PatientProfile, dose_plan: &DosePlan) -> PlanResult<RiskResult> {
    let agent = dose_plan.agent();
    let adjusted = adjusted_response(profile, agent)?;
    let dose = dose_plan.response_dose();

    let p_hypnosis = hill_probability(dose, adjusted.ec50_hypnosis, adjusted.hill);
    let p_adverse = hill_probability(dose, adjusted.ec50_adverse, adjusted.hill);
    if !(p_hypnosis.is_finite() && p_adverse.is_finite()) {
        return Err(PlanError::computation(format!(
            "response model for {} produced non-finite probabilities at dose {}",
            agent, dose
        )));
    }

    let therapeutic_index = adjusted.ec50_adverse / adjusted.ec50_hypnosis;
    let narrow_window = therapeutic_index <= 1.0;
    if narrow_window {
        warn!(
            "{}: therapeutic index {:.2} <= 1 - response curves are ill-separated",
            agent, therapeutic_index
        );
    }
    debug!(
        "{}: dose {:.3} -> p_hypnosis {:.3}, p_adverse {:.3}, TI {:.2}",
        agent, dose, p_hypnosis, p_adverse, therapeutic_index
    );

    Ok(RiskResult {
        agent,
        dose,
        p_hypnosis,
        p_adverse,
        therapeutic_index,
        narrow_window,
        base_ec50_hypnosis: adjusted.base_ec50_hypnosis,
        ec50_hypnosis: adjusted.ec50_hypnosis,
        base_ec50_adverse: adjusted.base_ec50_adverse,
        ec50_adverse: adjusted.ec50_adverse,
        hill: adjusted.hill,
        pd_effects: adjusted.pd_effects,
        safety_adjustments: adjusted.safety_adjustments,
        citations: adjusted.citations,
    })
}

/// One point on the personalized dose-response sweep.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct CurvePoint {
    pub dose_mg: f64,
    pub p_hypnosis: f64,
    pub p_adverse: f64,
}

pub const CURVE_SAMPLE_COUNT: usize = 100;

/// Lazy dose sweep from 0 to 3x the final dose, ascending, for the
/// visualization layer. Bolus dosing only; the caller collects it.
pub fn dose_response_curve(
    profile: &PatientProfile,
    dose: &DoseResult,
) -> PlanResult<impl Iterator<Item = CurvePoint>> {
    let adjusted = adjusted_response(profile, dose.agent)?;
    let weight_kg = dose.weight_scalar_kg;
    let max_dose_mg = dose.final_dose_mg * 3.0;

    Ok((0..CURVE_SAMPLE_COUNT).map(move |i| {
        let dose_mg = max_dose_mg * i as f64 / (CURVE_SAMPLE_COUNT - 1) as f64;
        let dose_per_kg = dose_mg / weight_kg;
        CurvePoint {
            dose_mg,
            p_hypnosis: hill_probability(dose_per_kg, adjusted.ec50_hypnosis, adjusted.hill),
            p_adverse: hill_probability(dose_per_kg, adjusted.ec50_adverse, adjusted.hill),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dose::calculate_dose;
    use crate::patient::fixtures::{minimal_profile, minimal_record};
    use crate::patient::PatientProfile;
    use crate::selection::Route;
    use approx::assert_relative_eq;

    fn propofol_plan(profile: &PatientProfile) -> DosePlan {
        calculate_dose(profile, Agent::Propofol, Route::Intravenous).unwrap()
    }

    #[test]
    fn test_hill_probability_half_maximal_at_ec50() {
        assert_relative_eq!(hill_probability(1.8, 1.8, 2.5), 0.5, epsilon = 1e-12);
        assert_relative_eq!(hill_probability(0.0, 1.8, 2.5), 0.0);
        assert!(hill_probability(100.0, 1.8, 2.5) > 0.99);
    }

    #[test]
    fn test_minimal_profile_risk_uses_base_ec50s() {
        let profile = minimal_profile();
        let risk = predict_risk(&profile, &propofol_plan(&profile)).unwrap();

        assert_relative_eq!(risk.ec50_hypnosis, 1.8, epsilon = 1e-12);
        assert_relative_eq!(risk.ec50_adverse, 2.3, epsilon = 1e-12);
        assert!(risk.safety_adjustments.is_empty());
        assert_relative_eq!(risk.therapeutic_index, 2.3 / 1.8, epsilon = 1e-12);
        assert!(!risk.narrow_window);
        assert!(risk.p_hypnosis > 0.0 && risk.p_hypnosis <= 1.0);
        assert!(risk.p_adverse >= 0.0 && risk.p_adverse <= 1.0);
    }

    #[test]
    fn test_all_four_markers_always_reported() {
        let profile = minimal_profile();
        let risk = predict_risk(&profile, &propofol_plan(&profile)).unwrap();

        let genes: Vec<&str> = risk.pd_effects.iter().map(|e| e.gene.as_str()).collect();
        assert_eq!(genes, vec!["GABRA1", "COMT", "OPRM1", "CACNA1C"]);

        // OPRM1 targets ketamine, so it reports a neutral factor here.
        let oprm1 = &risk.pd_effects[2];
        assert!(!oprm1.applied);
        assert_relative_eq!(oprm1.ec50_hypnosis_factor, 1.0);
    }

    #[test]
    fn test_gabra1_sensitivity_raises_hypnosis_probability() {
        let mut record = minimal_record();
        record.gabra1 = "rs4263535:G/G".to_string();
        let sensitive = PatientProfile::from_record(&record).unwrap();
        let reference = minimal_profile();

        // Same administered dose for both profiles.
        let plan = propofol_plan(&reference);
        let sensitive_risk = predict_risk(&sensitive, &plan).unwrap();
        let reference_risk = predict_risk(&reference, &plan).unwrap();

        assert_relative_eq!(sensitive_risk.ec50_hypnosis, 1.8 * 0.85, epsilon = 1e-12);
        assert!(sensitive_risk.p_hypnosis > reference_risk.p_hypnosis);
    }

    #[test]
    fn test_oprm1_only_shifts_ketamine() {
        let mut record = minimal_record();
        record.oprm1 = "A118G:G/G".to_string();
        let profile = PatientProfile::from_record(&record).unwrap();

        let propofol_risk = predict_risk(&profile, &propofol_plan(&profile)).unwrap();
        assert_relative_eq!(propofol_risk.ec50_hypnosis, 1.8, epsilon = 1e-12);

        let ketamine_plan =
            calculate_dose(&profile, Agent::Ketamine, Route::Intravenous).unwrap();
        let ketamine_risk = predict_risk(&profile, &ketamine_plan).unwrap();
        assert_relative_eq!(ketamine_risk.ec50_hypnosis, 1.0 * 1.15, epsilon = 1e-12);
    }

    #[test]
    fn test_comt_lowers_adverse_threshold_only() {
        let mut record = minimal_record();
        record.comt = "Val158Met:Met/Met".to_string();
        let profile = PatientProfile::from_record(&record).unwrap();

        let risk = predict_risk(&profile, &propofol_plan(&profile)).unwrap();
        assert_relative_eq!(risk.ec50_hypnosis, 1.8, epsilon = 1e-12);
        assert_relative_eq!(risk.ec50_adverse, 2.3 * 0.85, epsilon = 1e-12);
    }

    #[test]
    fn test_narrow_window_is_flagged_not_clamped() {
        let mut record = minimal_record();
        record.comt = "Val158Met:Met/Met".to_string();
        record.asa_class = Some(5);
        let profile = PatientProfile::from_record(&record).unwrap();

        let risk = predict_risk(&profile, &propofol_plan(&profile)).unwrap();
        // 2.3 x 0.85 x 0.70 = 1.3685 against a 1.8 hypnosis EC50.
        assert_relative_eq!(risk.ec50_adverse, 2.3 * 0.85 * 0.70, epsilon = 1e-12);
        assert!(risk.therapeutic_index < 1.0);
        assert!(risk.narrow_window);
    }

    #[test]
    fn test_volatile_risk_on_mac_scale() {
        let profile = minimal_profile();
        let plan = calculate_dose(&profile, Agent::Sevoflurane, Route::Inhalation).unwrap();
        let risk = predict_risk(&profile, &plan).unwrap();

        assert_relative_eq!(risk.dose, 1.0, epsilon = 1e-12);
        assert!(risk.p_hypnosis > 0.9);
        assert!(risk.therapeutic_index > 1.0);
    }

    #[test]
    fn test_curve_is_ascending_with_fixed_sample_count() {
        let profile = minimal_profile();
        let plan = propofol_plan(&profile);
        let dose = match &plan {
            DosePlan::Bolus(d) => d,
            DosePlan::Volatile(_) => unreachable!(),
        };

        let points: Vec<CurvePoint> = dose_response_curve(&profile, dose).unwrap().collect();
        assert_eq!(points.len(), CURVE_SAMPLE_COUNT);
        assert_relative_eq!(points[0].dose_mg, 0.0);
        assert_relative_eq!(
            points.last().unwrap().dose_mg,
            dose.final_dose_mg * 3.0,
            epsilon = 1e-9
        );
        for window in points.windows(2) {
            assert!(window[1].dose_mg > window[0].dose_mg);
            assert!(window[1].p_hypnosis >= window[0].p_hypnosis);
        }
    }

    #[test]
    fn test_curve_matches_point_risk_at_final_dose() {
        let profile = minimal_profile();
        let plan = propofol_plan(&profile);
        let risk = predict_risk(&profile, &plan).unwrap();
        let dose = match &plan {
            DosePlan::Bolus(d) => d,
            DosePlan::Volatile(_) => unreachable!(),
        };

        // Sample index 33 of 0..100 lands exactly on the final dose
        // (33/99 of 3x).
        let points: Vec<CurvePoint> = dose_response_curve(&profile, dose).unwrap().collect();
        let at_final = points[33];
        assert_relative_eq!(at_final.dose_mg, dose.final_dose_mg, epsilon = 1e-9);
        assert_relative_eq!(at_final.p_hypnosis, risk.p_hypnosis, epsilon = 1e-9);
        assert_relative_eq!(at_final.p_adverse, risk.p_adverse, epsilon = 1e-9);
    }
}
