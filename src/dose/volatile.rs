use log::debug;
use serde::Serialize;

use crate::error::{PlanError, PlanResult};
use crate::evidence::{refs, AdjustmentFactor, Citation};
use crate::patient::PatientProfile;
use crate::selection::{Agent, Route};

/// Mapleson base-10 age coefficient for MAC decline past age 40.
const MAC_AGE_SLOPE: f64 = -0.00269;

struct VolatileSpec {
    agent: Agent,
    base_mac_percent: f64,
    citations: &'static [Citation],
}

/// MAC values at age 40 (end-tidal %, 1.0 MAC).
static VOLATILE_SPECS: &[VolatileSpec] = &[
    VolatileSpec {
        agent: Agent::Sevoflurane,
        base_mac_percent: 2.0,
        citations: &[refs::SEVOFLURANE_AIRWAY],
    },
    VolatileSpec {
        agent: Agent::Desflurane,
        base_mac_percent: 6.0,
        citations: &[refs::DESFLURANE_EMERGENCE],
    },
    VolatileSpec {
        agent: Agent::Isoflurane,
        base_mac_percent: 1.2,
        citations: &[refs::ISOFLURANE_MAC],
    },
];

/// Age-adjusted MAC target for a volatile induction.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MacTarget {
    pub agent: Agent,
    pub route: Route,
    pub base_mac_percent: f64,
    pub age_adjustment: AdjustmentFactor,
    pub age_adjusted_mac_percent: f64,
    pub neuromonitoring_cap: Option<AdjustmentFactor>,
    pub target_mac_percent: f64,
    pub citations: Vec<Citation>,
}

/// Mapleson meta-analysis age correction: MAC_age = MAC_40 x 10^(b x dAge)
/// for ages over 40; no correction below.
pub fn mac_age_factor(age: u32) -> f64 {
    if age <= 40 {
        1.0
    } else {
        10f64.powf(MAC_AGE_SLOPE * f64::from(age - 40))
    }
}

pub fn mac_target(profile: &PatientProfile, agent: Agent) -> PlanResult<MacTarget> {
    let spec = VOLATILE_SPECS
        .iter()
        .find(|s| s.agent == agent)
        .ok_or_else(|| {
            PlanError::computation(format!("no MAC specification for agent {}", agent))
        })?;

    let age_factor = mac_age_factor(profile.age);
    let age_adjusted = spec.base_mac_percent * age_factor;
    if !age_adjusted.is_finite() || age_adjusted <= 0.0 {
        return Err(PlanError::computation(format!(
            "MAC age adjustment for {} produced {}",
            agent, age_adjusted
        )));
    }

    let age_adjustment = AdjustmentFactor::new(
        format!("Mapleson age correction (age {})", profile.age),
        age_factor,
        &[refs::MAPLESON_MAC_AGE],
    );

    // Neuromonitoring limits volatile depth to 0.5 MAC so evoked
    // potentials stay interpretable.
    let (neuromonitoring_cap, target) = if profile.neuromonitoring {
        let cap = AdjustmentFactor::new(
            "0.5 MAC cap for neuromonitoring",
            0.5,
            &[refs::NEUROMONITORING_MAC],
        );
        (Some(cap), age_adjusted * 0.5)
    } else {
        (None, age_adjusted)
    };

    debug!(
        "{}: MAC40 {:.2}% x {:.3} -> target {:.2}%",
        agent, spec.base_mac_percent, age_factor, target
    );

    Ok(MacTarget {
        agent,
        route: Route::Inhalation,
        base_mac_percent: spec.base_mac_percent,
        age_adjustment,
        age_adjusted_mac_percent: age_adjusted,
        neuromonitoring_cap,
        target_mac_percent: target,
        citations: spec.citations.to_vec(),
    })
}
