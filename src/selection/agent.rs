use log::debug;
use serde::Serialize;

use super::{Agent, Route};
use crate::error::{PlanError, PlanResult};
use crate::evidence::{refs, CitesEvidence, Citation};
use crate::patient::{PatientProfile, Ryr1Status};

/// A signed scoring contribution surfaced for one agent.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredFactor {
    pub factor: String,
    pub magnitude: String,
    pub weight: f64,
    pub citations: Vec<Citation>,
}

/// Full comparative assessment of one candidate agent. Infeasible agents
/// keep their score and factor lists for transparency but are excluded
/// from selection.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentAssessment {
    pub agent: Agent,
    pub feasible: bool,
    pub contraindication: Option<ScoredFactor>,
    pub score: f64,
    pub advantages: Vec<ScoredFactor>,
    pub disadvantages: Vec<ScoredFactor>,
}

impl AgentAssessment {
    fn disadvantage_weight(&self) -> f64 {
        self.disadvantages.iter().map(|d| d.weight).sum()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentSelection {
    pub chosen: Agent,
    pub score: f64,
    pub all_assessments: Vec<AgentAssessment>,
}

impl CitesEvidence for AgentSelection {
    fn collect_citations(&self, out: &mut Vec<Citation>) {
        for assessment in &self.all_assessments {
            if let Some(contraindication) = &assessment.contraindication {
                out.extend(contraindication.citations.iter().copied());
            }
            for factor in assessment
                .advantages
                .iter()
                .chain(assessment.disadvantages.iter())
            {
                out.extend(factor.citations.iter().copied());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Advantage,
    Disadvantage,
    Contraindication,
}

/// Clinical/genetic predicate a scoring rule is gated on. Kept as a closed
/// enum so the rule table stays declarative data.
#[derive(Debug, Clone, Copy)]
enum Condition {
    Always,
    /// Cardiovascular disease or ASA >= 3.
    CardiacCompromise,
    /// Cardiovascular disease with ASA >= 4.
    CriticalCardiac,
    /// Cardiovascular disease with diabetes.
    CardiacWithDiabetes,
    /// Hypertension with cardiovascular disease.
    HypertensiveCardiac,
    /// Hypertension with ASA >= 4.
    HypertensiveCritical,
    /// Reactive airway disease or COPD.
    BronchospasticDisease,
    CardiacDisease,
    NoCardiacDisease,
    Ryr1Variant,
}

impl Condition {
    fn holds(self, p: &PatientProfile) -> bool {
        match self {
            Condition::Always => true,
            Condition::CardiacCompromise => p.cardiovascular_disease || p.asa_class >= 3,
            Condition::CriticalCardiac => p.cardiovascular_disease && p.asa_class >= 4,
            Condition::CardiacWithDiabetes => p.cardiovascular_disease && p.diabetes,
            Condition::HypertensiveCardiac => p.hypertension && p.cardiovascular_disease,
            Condition::HypertensiveCritical => p.hypertension && p.asa_class >= 4,
            Condition::BronchospasticDisease => p.reactive_airway || p.copd,
            Condition::CardiacDisease => p.cardiovascular_disease,
            Condition::NoCardiacDisease => !p.cardiovascular_disease,
            Condition::Ryr1Variant => p.ryr1_variant == Ryr1Status::Variant,
        }
    }
}

struct ScoringRule {
    agent: Agent,
    condition: Condition,
    kind: RuleKind,
    factor: &'static str,
    magnitude: &'static str,
    weight: f64,
    citations: &'static [Citation],
}

/// Declarative scoring table. Row order fixes the order of the reported
/// advantage/disadvantage lists per agent.
static SCORING_RULES: &[ScoringRule] = &[
    // Propofol
    ScoringRule {
        agent: Agent::Propofol,
        condition: Condition::Always,
        kind: RuleKind::Advantage,
        factor: "Reduced PONV and smoother recovery",
        magnitude: "Lower early and late PONV versus volatile maintenance",
        weight: 2.0,
        citations: &[refs::PROPOFOL_PONV],
    },
    ScoringRule {
        agent: Agent::Propofol,
        condition: Condition::CardiacCompromise,
        kind: RuleKind::Disadvantage,
        factor: "Hypotension risk",
        magnitude: "20-35% severe hypotension in older adults; amplified with ASA >= III",
        weight: 2.5,
        citations: &[
            refs::PROPOFOL_HYPOTENSION_ELDERLY,
            refs::PROPOFOL_HYPOTENSION_META,
            refs::PROPOFOL_INDUCTION_RISK,
        ],
    },
    // Etomidate
    ScoringRule {
        agent: Agent::Etomidate,
        condition: Condition::CriticalCardiac,
        kind: RuleKind::Contraindication,
        factor: "Adrenal suppression in critically ill cardiovascular patients",
        magnitude: "Adrenal suppression increases mortality in critical illness",
        weight: 0.0,
        citations: &[refs::ETOMIDATE_ADRENAL_META, refs::ETOMIDATE_ADRENAL_REVIEW],
    },
    ScoringRule {
        agent: Agent::Etomidate,
        condition: Condition::CardiacCompromise,
        kind: RuleKind::Advantage,
        factor: "Hemodynamic stability",
        magnitude: "Significantly smaller MAP/HR drop than propofol (<10% MAP decrease)",
        weight: 3.0,
        citations: &[
            refs::ETOMIDATE_HEMODYNAMIC_RCT,
            refs::ETOMIDATE_HEMODYNAMIC_META,
        ],
    },
    ScoringRule {
        agent: Agent::Etomidate,
        condition: Condition::CardiacWithDiabetes,
        kind: RuleKind::Disadvantage,
        factor: "Adrenal suppression in diabetic cardiovascular patients",
        magnitude: "Increased risk of perioperative stress-response complications",
        weight: 1.5,
        citations: &[refs::ETOMIDATE_ADRENAL_META, refs::ETOMIDATE_ADRENAL_REVIEW],
    },
    ScoringRule {
        agent: Agent::Etomidate,
        condition: Condition::Always,
        kind: RuleKind::Disadvantage,
        factor: "Adrenal suppression",
        magnitude: "11-beta-hydroxylase inhibition; cortisol synthesis reduced for 6-24 h",
        weight: 2.0,
        citations: &[refs::ETOMIDATE_ADRENAL_META, refs::ETOMIDATE_ADRENAL_RCT],
    },
    // Ketamine
    ScoringRule {
        agent: Agent::Ketamine,
        condition: Condition::HypertensiveCardiac,
        kind: RuleKind::Contraindication,
        factor: "Hypertension with cardiovascular disease",
        magnitude: "Sympathomimetic effects increase cardiac risk",
        weight: 0.0,
        citations: &[refs::KETAMINE_CARDIOVASCULAR, refs::KETAMINE_CV_PROFILE],
    },
    ScoringRule {
        agent: Agent::Ketamine,
        condition: Condition::HypertensiveCritical,
        kind: RuleKind::Disadvantage,
        factor: "Hypertension in critically ill patients",
        magnitude: "Sympathomimetic effects may exacerbate hypertensive crisis",
        weight: 2.0,
        citations: &[refs::KETAMINE_CARDIOVASCULAR, refs::KETAMINE_CV_PROFILE],
    },
    ScoringRule {
        agent: Agent::Ketamine,
        condition: Condition::BronchospasticDisease,
        kind: RuleKind::Advantage,
        factor: "Bronchodilation",
        magnitude: "Reduces airway resistance in asthma and COPD exacerbations",
        weight: 2.5,
        citations: &[refs::KETAMINE_BRONCHODILATION, refs::KETAMINE_ASTHMA_SERIES],
    },
    ScoringRule {
        agent: Agent::Ketamine,
        condition: Condition::NoCardiacDisease,
        kind: RuleKind::Advantage,
        factor: "Maintained or increased blood pressure",
        magnitude: "Sympathomimetic support of BP and heart rate in normovolemia",
        weight: 1.5,
        citations: &[refs::KETAMINE_CARDIOVASCULAR, refs::KETAMINE_CV_PROFILE],
    },
    ScoringRule {
        agent: Agent::Ketamine,
        condition: Condition::CardiacDisease,
        kind: RuleKind::Disadvantage,
        factor: "Increased myocardial oxygen demand",
        magnitude: "Raised HR/BP risks ischemia in coronary disease",
        weight: 2.0,
        citations: &[refs::KETAMINE_CARDIOVASCULAR, refs::KETAMINE_CV_PROFILE],
    },
    // Sevoflurane
    ScoringRule {
        agent: Agent::Sevoflurane,
        condition: Condition::Ryr1Variant,
        kind: RuleKind::Contraindication,
        factor: "RYR1 pathogenic variant",
        magnitude: "Absolute malignant hyperthermia trigger with volatile agents",
        weight: 0.0,
        citations: &[refs::RYR1_MH, refs::MHAUS_GUIDELINES],
    },
    ScoringRule {
        agent: Agent::Sevoflurane,
        condition: Condition::Always,
        kind: RuleKind::Advantage,
        factor: "Low airway irritation",
        magnitude: "Non-pungent; under 5% cough or laryngospasm on inhalation induction",
        weight: 2.0,
        citations: &[refs::SEVOFLURANE_AIRWAY, refs::SEVOFLURANE_INDUCTION],
    },
    // Desflurane
    ScoringRule {
        agent: Agent::Desflurane,
        condition: Condition::Ryr1Variant,
        kind: RuleKind::Contraindication,
        factor: "RYR1 pathogenic variant",
        magnitude: "Absolute malignant hyperthermia trigger with volatile agents",
        weight: 0.0,
        citations: &[refs::RYR1_MH, refs::MHAUS_GUIDELINES],
    },
    ScoringRule {
        agent: Agent::Desflurane,
        condition: Condition::BronchospasticDisease,
        kind: RuleKind::Contraindication,
        factor: "High airway irritability",
        magnitude: "About 34% cough/laryngospasm incidence during inhalation induction",
        weight: 0.0,
        citations: &[refs::DESFLURANE_IRRITATION, refs::SEVOFLURANE_INDUCTION],
    },
    ScoringRule {
        agent: Agent::Desflurane,
        condition: Condition::Always,
        kind: RuleKind::Advantage,
        factor: "Rapid emergence",
        magnitude: "Blood:gas partition ~0.42; faster wake-up than isoflurane/sevoflurane",
        weight: 1.5,
        citations: &[refs::DESFLURANE_EMERGENCE, refs::DESFLURANE_RECOVERY],
    },
    // Isoflurane
    ScoringRule {
        agent: Agent::Isoflurane,
        condition: Condition::Ryr1Variant,
        kind: RuleKind::Contraindication,
        factor: "RYR1 pathogenic variant",
        magnitude: "Absolute malignant hyperthermia trigger with volatile agents",
        weight: 0.0,
        citations: &[refs::RYR1_MH, refs::MHAUS_GUIDELINES],
    },
    ScoringRule {
        agent: Agent::Isoflurane,
        condition: Condition::Always,
        kind: RuleKind::Disadvantage,
        factor: "Pungent odor and airway irritation",
        magnitude: "More cough and breath-holding than sevoflurane",
        weight: 1.0,
        citations: &[refs::DESFLURANE_IRRITATION],
    },
];

fn assess(agent: Agent, profile: &PatientProfile) -> AgentAssessment {
    let mut assessment = AgentAssessment {
        agent,
        feasible: true,
        contraindication: None,
        score: 0.0,
        advantages: Vec::new(),
        disadvantages: Vec::new(),
    };

    for rule in SCORING_RULES
        .iter()
        .filter(|r| r.agent == agent && r.condition.holds(profile))
    {
        let entry = ScoredFactor {
            factor: rule.factor.to_string(),
            magnitude: rule.magnitude.to_string(),
            weight: rule.weight,
            citations: rule.citations.to_vec(),
        };
        match rule.kind {
            RuleKind::Contraindication => {
                assessment.feasible = false;
                // First matching contraindication is the reported one.
                if assessment.contraindication.is_none() {
                    assessment.contraindication = Some(entry);
                }
            }
            RuleKind::Advantage => {
                assessment.score += rule.weight;
                assessment.advantages.push(entry);
            }
            RuleKind::Disadvantage => {
                assessment.score -= rule.weight;
                assessment.disadvantages.push(entry);
            }
        }
    }

    assessment
}

/// Assess every candidate in the route and pick the best feasible agent.
/// Score = sum of advantage weights minus sum of disadvantage weights;
/// ties break toward the lower cumulative disadvantage, then the fixed
/// candidate order.
pub fn select_agent(profile: &PatientProfile, route: Route) -> PlanResult<AgentSelection> {
    let all_assessments: Vec<AgentAssessment> = route
        .candidates()
        .iter()
        .map(|&agent| assess(agent, profile))
        .collect();

    for assessment in &all_assessments {
        debug!(
            "{}: feasible={} score={:.1}",
            assessment.agent, assessment.feasible, assessment.score
        );
    }

    let chosen = all_assessments
        .iter()
        .filter(|a| a.feasible)
        .fold(None::<&AgentAssessment>, |best, candidate| match best {
            None => Some(candidate),
            Some(current) => {
                if candidate.score > current.score
                    || (candidate.score == current.score
                        && candidate.disadvantage_weight() < current.disadvantage_weight())
                {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        });

    match chosen {
        Some(best) => Ok(AgentSelection {
            chosen: best.agent,
            score: best.score,
            all_assessments: all_assessments.clone(),
        }),
        None => Err(PlanError::Contraindication {
            route: route.label(),
            detail: "every candidate agent is contraindicated".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::fixtures::{minimal_profile, minimal_record};
    use crate::patient::{PatientProfile, Ryr1Status};

    #[test]
    fn test_minimal_profile_selects_propofol() {
        let selection = select_agent(&minimal_profile(), Route::Intravenous).unwrap();
        assert_eq!(selection.chosen, Agent::Propofol);
        assert_eq!(selection.score, 2.0);
    }

    #[test]
    fn test_all_candidates_always_assessed() {
        for route in [Route::Intravenous, Route::Inhalation] {
            let selection = select_agent(&minimal_profile(), route).unwrap();
            let agents: Vec<Agent> = selection
                .all_assessments
                .iter()
                .map(|a| a.agent)
                .collect();
            assert_eq!(agents, route.candidates());
        }
    }

    #[test]
    fn test_cardiac_compromise_prefers_etomidate() {
        let mut record = minimal_record();
        record.cardiovascular_disease = true;
        let profile = PatientProfile::from_record(&record).unwrap();

        // Propofol: PONV +2.0, hypotension -2.5 => -0.5
        // Etomidate: hemodynamics +3.0, adrenal -2.0 => +1.0
        // Ketamine: myocardial O2 demand -2.0 => -2.0
        let selection = select_agent(&profile, Route::Intravenous).unwrap();
        assert_eq!(selection.chosen, Agent::Etomidate);
        assert_eq!(selection.score, 1.0);
    }

    #[test]
    fn test_critical_cardiac_contraindicates_etomidate() {
        let mut record = minimal_record();
        record.cardiovascular_disease = true;
        record.asa_class = Some(4);
        let profile = PatientProfile::from_record(&record).unwrap();

        let selection = select_agent(&profile, Route::Intravenous).unwrap();
        let etomidate = selection
            .all_assessments
            .iter()
            .find(|a| a.agent == Agent::Etomidate)
            .unwrap();
        assert!(!etomidate.feasible);
        assert!(etomidate
            .contraindication
            .as_ref()
            .unwrap()
            .factor
            .contains("Adrenal suppression"));
        assert_ne!(selection.chosen, Agent::Etomidate);
    }

    #[test]
    fn test_hypertensive_cardiac_contraindicates_ketamine() {
        let mut record = minimal_record();
        record.cardiovascular_disease = true;
        record.hypertension = true;
        let profile = PatientProfile::from_record(&record).unwrap();

        let selection = select_agent(&profile, Route::Intravenous).unwrap();
        let ketamine = selection
            .all_assessments
            .iter()
            .find(|a| a.agent == Agent::Ketamine)
            .unwrap();
        assert!(!ketamine.feasible);
        assert_eq!(selection.chosen, Agent::Etomidate);
    }

    #[test]
    fn test_bronchospastic_disease_boosts_ketamine() {
        let mut record = minimal_record();
        record.reactive_airway = true;
        let profile = PatientProfile::from_record(&record).unwrap();

        // Ketamine: bronchodilation +2.5, BP support +1.5 => +4.0,
        // ahead of propofol's +2.0.
        let selection = select_agent(&profile, Route::Intravenous).unwrap();
        assert_eq!(selection.chosen, Agent::Ketamine);
        assert_eq!(selection.score, 4.0);
    }

    #[test]
    fn test_ryr1_variant_contraindicates_every_volatile() {
        let mut record = minimal_record();
        record.ryr1_variant = Ryr1Status::Variant;
        let profile = PatientProfile::from_record(&record).unwrap();

        let err = select_agent(&profile, Route::Inhalation).unwrap_err();
        match err {
            PlanError::Contraindication { route, .. } => assert_eq!(route, "Inhalation"),
            other => panic!("expected contraindication, got {:?}", other),
        }
    }

    #[test]
    fn test_volatile_selection_without_ryr1() {
        let selection = select_agent(&minimal_profile(), Route::Inhalation).unwrap();
        // Sevoflurane +2.0 vs desflurane +1.5 vs isoflurane -1.0.
        assert_eq!(selection.chosen, Agent::Sevoflurane);
    }

    #[test]
    fn test_reactive_airway_contraindicates_desflurane() {
        let mut record = minimal_record();
        record.reactive_airway = true;
        let profile = PatientProfile::from_record(&record).unwrap();

        let selection = select_agent(&profile, Route::Inhalation).unwrap();
        let desflurane = selection
            .all_assessments
            .iter()
            .find(|a| a.agent == Agent::Desflurane)
            .unwrap();
        assert!(!desflurane.feasible);
        assert_eq!(selection.chosen, Agent::Sevoflurane);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let profile = minimal_profile();
        let first = select_agent(&profile, Route::Intravenous).unwrap();
        let second = select_agent(&profile, Route::Intravenous).unwrap();
        assert_eq!(first, second);
    }
}
