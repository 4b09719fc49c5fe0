pub mod volatile;

pub use volatile::MacTarget;

use log::{debug, warn};
use serde::Serialize;

use crate::error::{PlanError, PlanResult};
use crate::evidence::{
    refs, AdjustmentFactor, CitesEvidence, Citation, CYP2B6_CLEARANCE, CYP2C9_CLEARANCE,
    CYP3A4_CLEARANCE, UGT1A9_CLEARANCE,
};
use crate::patient::PatientProfile;
use crate::selection::{Agent, Route};

/// Genotyped elimination pathway of an intravenous agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enzyme {
    Cyp2b6,
    Cyp3a4,
    Cyp2c9,
    Ugt1a9,
}

impl Enzyme {
    fn name(self) -> &'static str {
        match self {
            Enzyme::Cyp2b6 => "CYP2B6",
            Enzyme::Cyp3a4 => "CYP3A4",
            Enzyme::Cyp2c9 => "CYP2C9",
            Enzyme::Ugt1a9 => "UGT1A9",
        }
    }

    fn clearance_factor(self, profile: &PatientProfile) -> f64 {
        match self {
            Enzyme::Cyp2b6 => CYP2B6_CLEARANCE.clearance_factor(profile.cyp2b6),
            Enzyme::Cyp3a4 => CYP3A4_CLEARANCE.clearance_factor(profile.cyp3a4),
            Enzyme::Cyp2c9 => CYP2C9_CLEARANCE.clearance_factor(profile.cyp2c9),
            Enzyme::Ugt1a9 => UGT1A9_CLEARANCE.clearance_factor(profile.ugt1a9),
        }
    }

    fn phenotype_label(self, profile: &PatientProfile) -> String {
        match self {
            Enzyme::Cyp2b6 => format!("{:?}", profile.cyp2b6).to_uppercase(),
            Enzyme::Cyp3a4 => format!("{:?}", profile.cyp3a4).to_uppercase(),
            Enzyme::Cyp2c9 => format!("{:?}", profile.cyp2c9).to_uppercase(),
            Enzyme::Ugt1a9 => format!("{:?}", profile.ugt1a9).to_lowercase(),
        }
    }

    fn citations(self) -> &'static [Citation] {
        match self {
            Enzyme::Cyp2b6 => CYP2B6_CLEARANCE.citations,
            Enzyme::Cyp3a4 => CYP3A4_CLEARANCE.citations,
            Enzyme::Cyp2c9 => CYP2C9_CLEARANCE.citations,
            Enzyme::Ugt1a9 => UGT1A9_CLEARANCE.citations,
        }
    }
}

/// Fractional share of an agent's elimination attributed to one genotyped
/// enzyme. Shares below 1.0 partial-weight the enzyme's clearance effect.
pub struct MetabolicPathway {
    pub enzyme: Enzyme,
    pub share: f64,
}

/// Per-agent induction dosing constants. Base doses and bounds are
/// literature values for adult IV bolus induction.
pub struct DoseSpec {
    pub agent: Agent,
    pub base_dose_mg_per_kg: f64,
    pub min_dose_mg_per_kg: f64,
    pub max_dose_mg_per_kg: f64,
    pub pathways: &'static [MetabolicPathway],
    pub citations: &'static [Citation],
}

static DOSE_SPECS: &[DoseSpec] = &[
    DoseSpec {
        agent: Agent::Propofol,
        base_dose_mg_per_kg: 2.0,
        min_dose_mg_per_kg: 1.0,
        max_dose_mg_per_kg: 2.5,
        // UGT1A9 glucuronidation dominates propofol elimination (~70%).
        pathways: &[
            MetabolicPathway {
                enzyme: Enzyme::Ugt1a9,
                share: 0.70,
            },
            MetabolicPathway {
                enzyme: Enzyme::Cyp2b6,
                share: 0.20,
            },
            MetabolicPathway {
                enzyme: Enzyme::Cyp2c9,
                share: 0.10,
            },
        ],
        citations: &[refs::DIPRIVAN_LABEL, refs::UGT1A9_GLUCURONIDATION],
    },
    DoseSpec {
        agent: Agent::Etomidate,
        base_dose_mg_per_kg: 0.3,
        min_dose_mg_per_kg: 0.2,
        max_dose_mg_per_kg: 0.6,
        // Plasma esterases carry ~80% of elimination and are not genotyped;
        // only the minor CYP3A4 fraction adjusts the dose.
        pathways: &[MetabolicPathway {
            enzyme: Enzyme::Cyp3a4,
            share: 0.15,
        }],
        citations: &[refs::AMIDATE_LABEL],
    },
    DoseSpec {
        agent: Agent::Ketamine,
        base_dose_mg_per_kg: 2.0,
        min_dose_mg_per_kg: 0.5,
        max_dose_mg_per_kg: 2.0,
        pathways: &[
            MetabolicPathway {
                enzyme: Enzyme::Cyp3a4,
                share: 0.50,
            },
            MetabolicPathway {
                enzyme: Enzyme::Cyp2b6,
                share: 0.30,
            },
            MetabolicPathway {
                enzyme: Enzyme::Cyp2c9,
                share: 0.10,
            },
        ],
        citations: &[refs::KETALAR_LABEL, refs::CYP3A4_KETAMINE],
    },
];

pub fn dose_spec(agent: Agent) -> Option<&'static DoseSpec> {
    DOSE_SPECS.iter().find(|s| s.agent == agent)
}

/// Mass dose for an IV bolus induction, with the full adjustment audit
/// trail. `final_dose_mg` always equals base x weight x product of every
/// recorded multiplier (the safety bound, when present, is one of them).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DoseResult {
    pub agent: Agent,
    pub route: Route,
    pub base_dose_mg_per_kg: f64,
    pub weight_scalar_kg: f64,
    pub pk_adjustments: Vec<AdjustmentFactor>,
    pub clinical_adjustments: Vec<AdjustmentFactor>,
    pub safety_bound: Option<AdjustmentFactor>,
    pub final_dose_mg: f64,
    pub final_dose_mg_per_kg: f64,
    pub citations: Vec<Citation>,
}

/// Dosing output of the pipeline; the response scale differs by route
/// (mg/kg for an IV bolus, MAC multiple for a volatile target).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DosePlan {
    Bolus(DoseResult),
    Volatile(MacTarget),
}

impl DosePlan {
    pub fn agent(&self) -> Agent {
        match self {
            DosePlan::Bolus(d) => d.agent,
            DosePlan::Volatile(m) => m.agent,
        }
    }

    /// Dose on the response scale of the agent's Emax model.
    pub fn response_dose(&self) -> f64 {
        match self {
            DosePlan::Bolus(d) => d.final_dose_mg_per_kg,
            DosePlan::Volatile(m) => m.target_mac_percent / m.age_adjusted_mac_percent,
        }
    }
}

impl CitesEvidence for DosePlan {
    fn collect_citations(&self, out: &mut Vec<Citation>) {
        match self {
            DosePlan::Bolus(d) => {
                out.extend(d.citations.iter().copied());
                for factor in d
                    .pk_adjustments
                    .iter()
                    .chain(d.clinical_adjustments.iter())
                    .chain(d.safety_bound.iter())
                {
                    out.extend(factor.citations.iter().copied());
                }
            }
            DosePlan::Volatile(m) => {
                out.extend(m.citations.iter().copied());
                out.extend(m.age_adjustment.citations.iter().copied());
                if let Some(cap) = &m.neuromonitoring_cap {
                    out.extend(cap.citations.iter().copied());
                }
            }
        }
    }
}

/// Compute the dose for the chosen agent. PD genetics are deliberately not
/// applied here; they shift response curves, not administered mass.
pub fn calculate_dose(
    profile: &PatientProfile,
    agent: Agent,
    route: Route,
) -> PlanResult<DosePlan> {
    if agent.route() != route {
        return Err(PlanError::computation(format!(
            "agent {} is not a {} agent",
            agent, route
        )));
    }

    match route {
        Route::Intravenous => calculate_bolus_dose(profile, agent).map(DosePlan::Bolus),
        Route::Inhalation => volatile::mac_target(profile, agent).map(DosePlan::Volatile),
    }
}

fn calculate_bolus_dose(profile: &PatientProfile, agent: Agent) -> PlanResult<DoseResult> {
    let spec = dose_spec(agent).ok_or_else(|| {
        PlanError::computation(format!("no dose specification for agent {}", agent))
    })?;

    let weight_kg = profile.weight_kg;
    let pk_adjustments = pk_adjustments(spec, profile);
    let clinical_adjustments = clinical_adjustments(agent, profile);

    let total_adjustment: f64 = pk_adjustments
        .iter()
        .chain(clinical_adjustments.iter())
        .map(|a| a.multiplier)
        .product();
    let adjusted_mg = spec.base_dose_mg_per_kg * weight_kg * total_adjustment;

    if !adjusted_mg.is_finite() || adjusted_mg <= 0.0 {
        return Err(PlanError::computation(format!(
            "adjustment chain for {} produced non-finite dose {} (total adjustment {})",
            agent, adjusted_mg, total_adjustment
        )));
    }
    debug!(
        "{}: base {:.2} mg/kg x {:.1} kg x {:.3} = {:.1} mg",
        agent, spec.base_dose_mg_per_kg, weight_kg, total_adjustment, adjusted_mg
    );

    let floor_mg = spec.min_dose_mg_per_kg * weight_kg;
    let (ceiling_mg, ceiling_note) = dynamic_ceiling(spec, profile);

    let mut safety_bound = None;
    let mut final_mg = adjusted_mg;
    if adjusted_mg > ceiling_mg {
        warn!(
            "{} dose {:.1} mg clamped to safety ceiling {:.1} mg",
            agent, adjusted_mg, ceiling_mg
        );
        safety_bound = Some(AdjustmentFactor::new(
            format!("Safety ceiling {:.1} mg ({})", ceiling_mg, ceiling_note),
            ceiling_mg / adjusted_mg,
            spec.citations,
        ));
        final_mg = ceiling_mg;
    } else if adjusted_mg < floor_mg {
        // The dynamic ceiling keeps priority over the published floor.
        let bound_mg = floor_mg.min(ceiling_mg);
        warn!(
            "{} dose {:.1} mg raised to safety floor {:.1} mg",
            agent, adjusted_mg, bound_mg
        );
        safety_bound = Some(AdjustmentFactor::new(
            format!(
                "Safety floor {:.1} mg ({:.1} mg/kg label minimum)",
                bound_mg, spec.min_dose_mg_per_kg
            ),
            bound_mg / adjusted_mg,
            spec.citations,
        ));
        final_mg = bound_mg;
    }

    Ok(DoseResult {
        agent,
        route: Route::Intravenous,
        base_dose_mg_per_kg: spec.base_dose_mg_per_kg,
        weight_scalar_kg: weight_kg,
        pk_adjustments,
        clinical_adjustments,
        safety_bound,
        final_dose_mg: final_mg,
        final_dose_mg_per_kg: final_mg / weight_kg,
        citations: spec.citations.to_vec(),
    })
}

/// Pathway-weighted pharmacokinetic multipliers. A pathway carrying only
/// part of the elimination gets a partial multiplier,
/// `1 + share x (clearance_factor - 1)`, so an enzyme the agent barely
/// uses cannot over-correct the dose.
fn pk_adjustments(spec: &DoseSpec, profile: &PatientProfile) -> Vec<AdjustmentFactor> {
    spec.pathways
        .iter()
        .map(|pathway| {
            let clearance = pathway.enzyme.clearance_factor(profile);
            let multiplier = 1.0 + pathway.share * (clearance - 1.0);
            AdjustmentFactor::new(
                format!(
                    "{} {} ({:.0}% pathway share)",
                    pathway.enzyme.name(),
                    pathway.enzyme.phenotype_label(profile),
                    pathway.share * 100.0
                ),
                multiplier,
                pathway.enzyme.citations(),
            )
        })
        .collect()
}

/// Non-genetic dose multipliers: age band, progressive ASA reduction, and
/// a conservative cardiovascular reduction for propofol.
fn clinical_adjustments(agent: Agent, profile: &PatientProfile) -> Vec<AdjustmentFactor> {
    let mut factors = Vec::new();

    if profile.age >= 75 {
        factors.push(AdjustmentFactor::new(
            "Age >= 75",
            0.65,
            &[refs::ELDERLY_DOSE_REDUCTION],
        ));
    } else if profile.age >= 65 {
        factors.push(AdjustmentFactor::new(
            "Age 65-74",
            0.80,
            &[refs::ELDERLY_DOSE_REDUCTION],
        ));
    }

    let asa_multiplier = match profile.asa_class {
        1 => 1.00,
        2 => 0.95,
        3 => 0.85,
        4 => 0.75,
        _ => 0.65,
    };
    if asa_multiplier < 1.0 {
        factors.push(AdjustmentFactor::new(
            format!("ASA {} physical status", profile.asa_class),
            asa_multiplier,
            &[refs::ASA_CLASSIFICATION],
        ));
    }

    if agent == Agent::Propofol && (profile.cardiovascular_disease || profile.heart_failure) {
        factors.push(AdjustmentFactor::new(
            "Cardiovascular disease / heart failure",
            0.80,
            &[refs::PROPOFOL_VASODILATION, refs::IV_TITRATABLE],
        ));
    }

    factors
}

/// Published label ceiling, tightened for vulnerable populations.
fn dynamic_ceiling(spec: &DoseSpec, profile: &PatientProfile) -> (f64, String) {
    let mut factor = 1.0;
    let mut notes: Vec<&str> = Vec::new();

    if profile.age >= 85 {
        factor *= 0.75;
        notes.push("25% reduction for age >= 85");
    } else if profile.age >= 75 {
        factor *= 0.85;
        notes.push("15% reduction for age >= 75");
    }

    if profile.heart_failure {
        factor *= 0.80;
        notes.push("20% reduction for heart failure");
    } else if profile.cardiovascular_disease && profile.asa_class >= 4 {
        factor *= 0.85;
        notes.push("15% reduction for critical cardiovascular disease");
    }

    if profile.asa_class >= 5 {
        factor *= 0.70;
        notes.push("30% reduction for ASA 5");
    } else if profile.asa_class == 4 {
        factor *= 0.85;
        notes.push("15% reduction for ASA 4");
    }

    let ceiling_mg = spec.max_dose_mg_per_kg * profile.weight_kg * factor;
    let note = if notes.is_empty() {
        format!("{:.1} mg/kg label maximum", spec.max_dose_mg_per_kg)
    } else {
        format!(
            "{:.1} mg/kg label maximum; {}",
            spec.max_dose_mg_per_kg,
            notes.join(", ")
        )
    };

    (ceiling_mg, note)
}
