use serde::{Deserialize, Serialize};

use crate::error::{FieldError, PlanError, PlanResult};
use crate::evidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    M,
    F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmokingStatus {
    #[default]
    Never,
    Former,
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlcoholUse {
    #[default]
    None,
    Social,
    Heavy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Ryr1Status {
    #[default]
    Normal,
    Variant,
}

/// CYP enzyme metabolizer phenotype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Metabolizer {
    Pm,
    Im,
    #[default]
    Nm,
    Rm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ugt1a9Activity {
    Decreased,
    #[default]
    Normal,
    Increased,
}

fn default_gabra1() -> String {
    "rs4263535:A/A".to_string()
}

fn default_comt() -> String {
    "Val158Met:Val/Val".to_string()
}

fn default_oprm1() -> String {
    "A118G:A/A".to_string()
}

fn default_cacna1c() -> String {
    "rs1006737:G/G".to_string()
}

/// Caller-supplied patient record as it arrives over the wire. Optional
/// fields default here; `asa_class` stays optional and is derived during
/// profile construction when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub age: u32,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub gender: Gender,

    #[serde(default)]
    pub asa_class: Option<u8>,
    #[serde(default)]
    pub cardiovascular_disease: bool,
    #[serde(default)]
    pub heart_failure: bool,
    #[serde(default)]
    pub reactive_airway: bool,
    #[serde(default)]
    pub copd: bool,
    #[serde(default)]
    pub diabetes: bool,
    #[serde(default)]
    pub hypertension: bool,
    #[serde(default)]
    pub smoking_status: SmokingStatus,
    #[serde(default)]
    pub alcohol_use: AlcoholUse,

    pub procedure_duration_min: u32,
    #[serde(default)]
    pub neuromonitoring: bool,

    #[serde(default)]
    pub ryr1_variant: Ryr1Status,
    #[serde(default)]
    pub cyp2b6: Metabolizer,
    #[serde(default)]
    pub cyp3a4: Metabolizer,
    #[serde(default)]
    pub cyp2c9: Metabolizer,
    #[serde(default)]
    pub ugt1a9: Ugt1a9Activity,

    #[serde(default = "default_gabra1")]
    pub gabra1: String,
    #[serde(default = "default_comt")]
    pub comt: String,
    #[serde(default = "default_oprm1")]
    pub oprm1: String,
    #[serde(default = "default_cacna1c")]
    pub cacna1c: String,
}

/// Validated, fully-defaulted profile. Immutable for the remainder of the
/// pipeline; every downstream component takes `&PatientProfile`.
#[derive(Debug, Clone, Serialize)]
pub struct PatientProfile {
    pub age: u32,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub gender: Gender,

    pub asa_class: u8,
    pub asa_reason: String,
    pub cardiovascular_disease: bool,
    pub heart_failure: bool,
    pub reactive_airway: bool,
    pub copd: bool,
    pub diabetes: bool,
    pub hypertension: bool,
    pub smoking_status: SmokingStatus,
    pub alcohol_use: AlcoholUse,

    pub procedure_duration_min: u32,
    pub neuromonitoring: bool,

    pub ryr1_variant: Ryr1Status,
    pub cyp2b6: Metabolizer,
    pub cyp3a4: Metabolizer,
    pub cyp2c9: Metabolizer,
    pub ugt1a9: Ugt1a9Activity,

    pub gabra1: String,
    pub comt: String,
    pub oprm1: String,
    pub cacna1c: String,
}

impl PatientProfile {
    /// Validate the raw record, derive ASA class when absent, and freeze
    /// the result. All offending fields are collected before failing.
    pub fn from_record(record: &PatientRecord) -> PlanResult<Self> {
        let mut errors = check_ranges(
            record.age,
            record.weight_kg,
            record.height_cm,
            record.procedure_duration_min,
        );

        if let Some(asa) = record.asa_class {
            if !(1..=5).contains(&asa) {
                errors.push(FieldError {
                    field: "asa_class",
                    message: format!("ASA class {} out of valid range (1-5)", asa),
                });
            }
        }

        check_pd_markers(
            &record.gabra1,
            &record.comt,
            &record.oprm1,
            &record.cacna1c,
            &mut errors,
        );

        if !errors.is_empty() {
            return Err(PlanError::Validation(errors));
        }

        let bmi = bmi(record.weight_kg, record.height_cm);
        let (derived_asa, derived_reason) = derive_asa_class(record, bmi);
        let (mut asa_class, mut asa_reason) = match record.asa_class {
            Some(asa) => (asa, format!("ASA {} (caller-supplied)", asa)),
            None => (derived_asa, derived_reason),
        };

        // Severe-comorbidity floor: ASA can never understate documented
        // severe systemic disease.
        let floor = 1 + severe_comorbidity_count(record);
        if asa_class < floor {
            asa_reason = format!(
                "{}; raised to ASA {} by severe comorbidity floor",
                asa_reason, floor
            );
            asa_class = floor;
        }
        let asa_class = asa_class.min(5);

        Ok(Self {
            age: record.age,
            weight_kg: record.weight_kg,
            height_cm: record.height_cm,
            gender: record.gender,
            asa_class,
            asa_reason,
            cardiovascular_disease: record.cardiovascular_disease,
            heart_failure: record.heart_failure,
            reactive_airway: record.reactive_airway,
            copd: record.copd,
            diabetes: record.diabetes,
            hypertension: record.hypertension,
            smoking_status: record.smoking_status,
            alcohol_use: record.alcohol_use,
            procedure_duration_min: record.procedure_duration_min,
            neuromonitoring: record.neuromonitoring,
            ryr1_variant: record.ryr1_variant,
            cyp2b6: record.cyp2b6,
            cyp3a4: record.cyp3a4,
            cyp2c9: record.cyp2c9,
            ugt1a9: record.ugt1a9,
            gabra1: record.gabra1.clone(),
            comt: record.comt.clone(),
            oprm1: record.oprm1.clone(),
            cacna1c: record.cacna1c.clone(),
        })
    }

    /// Defensive re-assertion of the construction invariants. The pipeline
    /// does not trust that its caller went through `from_record`.
    pub fn validate(&self) -> PlanResult<()> {
        let mut errors = check_ranges(
            self.age,
            self.weight_kg,
            self.height_cm,
            self.procedure_duration_min,
        );

        if !(1..=5).contains(&self.asa_class) {
            errors.push(FieldError {
                field: "asa_class",
                message: format!("ASA class {} out of valid range (1-5)", self.asa_class),
            });
        }

        check_pd_markers(&self.gabra1, &self.comt, &self.oprm1, &self.cacna1c, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PlanError::Validation(errors))
        }
    }

    pub fn bmi(&self) -> f64 {
        bmi(self.weight_kg, self.height_cm)
    }
}

fn bmi(weight_kg: f64, height_cm: f64) -> f64 {
    weight_kg / (height_cm / 100.0).powi(2)
}

fn check_ranges(age: u32, weight_kg: f64, height_cm: f64, duration_min: u32) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if !(18..=95).contains(&age) {
        errors.push(FieldError {
            field: "age",
            message: format!("age {} out of valid range (18-95 years)", age),
        });
    }
    if !(30.0..=220.0).contains(&weight_kg) {
        errors.push(FieldError {
            field: "weight_kg",
            message: format!("weight {} kg out of valid range (30-220 kg)", weight_kg),
        });
    }
    if !(120.0..=220.0).contains(&height_cm) {
        errors.push(FieldError {
            field: "height_cm",
            message: format!("height {} cm out of valid range (120-220 cm)", height_cm),
        });
    }
    if !(1..=1440).contains(&duration_min) {
        errors.push(FieldError {
            field: "procedure_duration_min",
            message: format!(
                "procedure duration {} min out of valid range (1-1440 min)",
                duration_min
            ),
        });
    }

    errors
}

fn check_pd_markers(
    gabra1: &str,
    comt: &str,
    oprm1: &str,
    cacna1c: &str,
    errors: &mut Vec<FieldError>,
) {
    let markers: [(&'static str, &str); 4] = [
        ("gabra1", gabra1),
        ("comt", comt),
        ("oprm1", oprm1),
        ("cacna1c", cacna1c),
    ];

    for (gene, variant) in markers {
        if evidence::pd_variant(gene, variant).is_none() {
            errors.push(FieldError {
                field: gene,
                message: format!(
                    "{} variant {:?} not in {:?}",
                    gene.to_uppercase(),
                    variant,
                    evidence::pd_variant_names(gene)
                ),
            });
        }
    }
}

/// Comorbidities that individually establish severe systemic disease and
/// floor the ASA class at `1 + count`.
fn severe_comorbidity_count(record: &PatientRecord) -> u8 {
    [record.heart_failure, record.copd]
        .iter()
        .filter(|&&present| present)
        .count() as u8
}

/// ASA Physical Status derivation from comorbidity burden, BMI, age,
/// smoking, and alcohol use, following the official classification ladder.
fn derive_asa_class(record: &PatientRecord, bmi: f64) -> (u8, String) {
    // ASA IV: severe systemic disease that is a constant threat to life.
    if record.heart_failure {
        return (
            4,
            "ASA IV: heart failure (severe systemic disease, constant threat to life)".to_string(),
        );
    }

    // ASA III: severe systemic disease.
    let mut severe = Vec::new();
    if record.copd {
        severe.push("COPD".to_string());
    }
    if record.cardiovascular_disease && record.age > 70 {
        severe.push("CVD with age >70".to_string());
    }
    if record.cardiovascular_disease && record.diabetes {
        severe.push("CVD with diabetes".to_string());
    }
    if bmi >= 40.0 {
        severe.push(format!("morbid obesity (BMI {:.1})", bmi));
    }
    if record.diabetes && bmi > 35.0 {
        severe.push("diabetes with obesity".to_string());
    }
    if !severe.is_empty() {
        return (
            3,
            format!("ASA III: severe systemic disease ({})", severe.join(", ")),
        );
    }

    // ASA II: mild systemic disease.
    let mut mild = Vec::new();
    if record.diabetes {
        mild.push("diabetes".to_string());
    }
    if record.hypertension {
        mild.push("hypertension".to_string());
    }
    if record.cardiovascular_disease {
        mild.push("cardiovascular disease".to_string());
    }
    if record.reactive_airway {
        mild.push("reactive airway".to_string());
    }
    if (30.0..40.0).contains(&bmi) {
        mild.push(format!("obesity (BMI {:.1})", bmi));
    }
    if record.smoking_status == SmokingStatus::Current {
        mild.push("current smoking".to_string());
    }
    if record.alcohol_use == AlcoholUse::Heavy {
        mild.push("heavy alcohol use".to_string());
    }
    if record.age > 80 {
        mild.push("advanced age".to_string());
    }
    if !mild.is_empty() {
        return (
            2,
            format!("ASA II: mild systemic disease ({})", mild.join(", ")),
        );
    }

    (1, "ASA I: normal healthy patient".to_string())
}


#[cfg(test)]
mod tests {
    use super::fixtures::minimal_record;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_minimal_record_defaults() {
        let record = minimal_record();
        assert_eq!(record.cyp2b6, Metabolizer::Nm);
        assert_eq!(record.ugt1a9, Ugt1a9Activity::Normal);
        assert_eq!(record.ryr1_variant, Ryr1Status::Normal);
        assert_eq!(record.gabra1, "rs4263535:A/A");
        assert_eq!(record.comt, "Val158Met:Val/Val");
        assert_eq!(record.oprm1, "A118G:A/A");
        assert_eq!(record.cacna1c, "rs1006737:G/G");
        assert!(!record.cardiovascular_disease);
        assert_eq!(record.smoking_status, SmokingStatus::Never);
    }

    #[test]
    fn test_metabolizer_wire_format() {
        let m: Metabolizer = serde_json::from_str("\"PM\"").unwrap();
        assert_eq!(m, Metabolizer::Pm);
        let u: Ugt1a9Activity = serde_json::from_str("\"decreased\"").unwrap();
        assert_eq!(u, Ugt1a9Activity::Decreased);
        let r: Ryr1Status = serde_json::from_str("\"Variant\"").unwrap();
        assert_eq!(r, Ryr1Status::Variant);
    }

    #[test]
    fn test_healthy_profile_is_asa_one() {
        let profile = PatientProfile::from_record(&minimal_record()).unwrap();
        assert_eq!(profile.asa_class, 1);
        assert_relative_eq!(profile.bmi(), 70.0 / (1.75 * 1.75), epsilon = 1e-9);
    }

    #[test]
    fn test_heart_failure_derives_asa_four() {
        let mut record = minimal_record();
        record.heart_failure = true;
        let profile = PatientProfile::from_record(&record).unwrap();
        assert_eq!(profile.asa_class, 4);
        assert!(profile.asa_reason.contains("heart failure"));
    }

    #[test]
    fn test_copd_derives_asa_three() {
        let mut record = minimal_record();
        record.copd = true;
        let profile = PatientProfile::from_record(&record).unwrap();
        assert_eq!(profile.asa_class, 3);
        assert!(profile.asa_reason.contains("COPD"));
    }

    #[test]
    fn test_mild_disease_derives_asa_two() {
        let mut record = minimal_record();
        record.hypertension = true;
        let profile = PatientProfile::from_record(&record).unwrap();
        assert_eq!(profile.asa_class, 2);
        assert!(profile.asa_reason.contains("hypertension"));
    }

    #[test]
    fn test_morbid_obesity_derives_asa_three() {
        let mut record = minimal_record();
        record.weight_kg = 130.0; // BMI 42.4 at 175 cm
        let profile = PatientProfile::from_record(&record).unwrap();
        assert_eq!(profile.asa_class, 3);
        assert!(profile.asa_reason.contains("morbid obesity"));
    }

    #[test]
    fn test_supplied_asa_is_honored() {
        let mut record = minimal_record();
        record.asa_class = Some(3);
        let profile = PatientProfile::from_record(&record).unwrap();
        assert_eq!(profile.asa_class, 3);
        assert!(profile.asa_reason.contains("caller-supplied"));
    }

    #[test]
    fn test_supplied_asa_floored_by_severe_comorbidity() {
        let mut record = minimal_record();
        record.asa_class = Some(1);
        record.heart_failure = true;
        record.copd = true;
        let profile = PatientProfile::from_record(&record).unwrap();
        assert_eq!(profile.asa_class, 3);
        assert!(profile.asa_reason.contains("severe comorbidity floor"));
    }

    #[test]
    fn test_validation_collects_every_offending_field() {
        let mut record = minimal_record();
        record.age = 10;
        record.weight_kg = 10.0;
        record.height_cm = 300.0;
        record.gabra1 = "rs4263535:T/T".to_string();

        let err = PatientProfile::from_record(&record).unwrap_err();
        match err {
            PlanError::Validation(fields) => {
                let names: Vec<_> = fields.iter().map(|f| f.field).collect();
                assert_eq!(names, vec!["age", "weight_kg", "height_cm", "gabra1"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_profile_validate_is_idempotent_with_construction() {
        let profile = PatientProfile::from_record(&minimal_record()).unwrap();
        assert!(profile.validate().is_ok());
    }
}
