use crate::dose::DosePlan;
use crate::error::PlanResult;
use crate::plan::Plan;
use crate::risk::CurvePoint;
use log::info;
use std::fs::File;
use std::path::Path;

/// Write every artifact of a computed plan into the output directory.
pub fn save_results<P: AsRef<Path>>(plan: &Plan, output_dir: P) -> PlanResult<()> {
    let output_path = output_dir.as_ref();

    save_plan(plan, output_path.join("plan.json"))?;

    if let Some(samples) = &plan.curve_samples {
        save_curve_samples(samples, output_path.join("dose_response.csv"))?;
    }

    generate_report(plan, output_path.join("plan_report.md"))?;

    info!("All results saved to {:?}", output_path);
    Ok(())
}

fn save_plan<P: AsRef<Path>>(plan: &Plan, path: P) -> PlanResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, plan)?;
    Ok(())
}

fn save_curve_samples<P: AsRef<Path>>(samples: &[CurvePoint], path: P) -> PlanResult<()> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record(["DOSE_MG", "P_HYPNOSIS", "P_ADVERSE"])?;

    for point in samples {
        writer.write_record(&[
            point.dose_mg.to_string(),
            point.p_hypnosis.to_string(),
            point.p_adverse.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Generate a human-readable plan summary.
pub fn generate_report<P: AsRef<Path>>(plan: &Plan, path: P) -> PlanResult<()> {
    let dose_line = match &plan.dose {
        DosePlan::Bolus(dose) => format!(
            "{:.1} mg IV bolus ({:.2} mg/kg at {:.1} kg)",
            dose.final_dose_mg, dose.final_dose_mg_per_kg, dose.weight_scalar_kg
        ),
        DosePlan::Volatile(target) => format!(
            "{:.2}% end-tidal {} (age-adjusted MAC {:.2}%)",
            target.target_mac_percent, target.agent, target.age_adjusted_mac_percent
        ),
    };

    let window_line = if plan.risk.narrow_window {
        "**WARNING**: therapeutic index <= 1 - response curves are ill-separated."
    } else {
        "Therapeutic window is adequately separated."
    };

    let report_content = format!(
        r#"# Anesthesia Induction Plan

## Patient
- **Age**: {} ({})
- **BMI**: {:.1}
- **ASA**: {}

## Recommendation
- **Route**: {} - {}
- **Agent**: {} (score {:.1})
- **Dose**: {}

## Predicted Response
- **P(hypnosis)**: {:.1}%
- **P(adverse event)**: {:.1}%
- **Therapeutic index**: {:.2}

{}

## Evidence
- {} deduplicated sources ({} PK, {} PD, {} clinical)
- Grade: {}
"#,
        plan.patient.age,
        plan.patient.asa_reason,
        plan.patient.bmi,
        plan.patient.asa_class,
        plan.route.chosen,
        plan.route.reason,
        plan.agent.chosen,
        plan.agent.score,
        dose_line,
        plan.risk.p_hypnosis * 100.0,
        plan.risk.p_adverse * 100.0,
        plan.risk.therapeutic_index,
        window_line,
        plan.evidence.total_sources,
        plan.evidence.pharmacokinetics,
        plan.evidence.pharmacodynamics,
        plan.evidence.clinical_guidelines,
        plan.evidence.evidence_grade,
    );

    std::fs::write(path, report_content)?;
    Ok(())
}
