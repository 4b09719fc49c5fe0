use anyhow::Context;
use clap::Parser;
use log::info;
use std::path::PathBuf;

mod dose;
mod error;
mod evidence;
mod output;
mod patient;
mod plan;
mod risk;
mod selection;

use crate::patient::{PatientProfile, PatientRecord};
use crate::plan::{compute_plan, PlanOptions};

#[derive(Parser)]
#[command(name = "anesthesia_planner")]
#[command(about = "Pharmacogenomic anesthesia induction planning engine")]
struct Cli {
    /// Patient record file path (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory
    #[arg(short, long)]
    output: PathBuf,

    /// Attach dose-response curve samples to the plan
    #[arg(short, long)]
    curve_samples: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    // Load and validate the patient record
    let content = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read patient record {:?}", cli.input))?;
    let record: PatientRecord =
        serde_json::from_str(&content).with_context(|| "malformed patient record")?;
    let profile = PatientProfile::from_record(&record)?;
    info!(
        "Loaded patient record from {:?} ({})",
        cli.input, profile.asa_reason
    );

    // Compute the plan
    let options = PlanOptions {
        include_curve_samples: cli.curve_samples,
    };
    let plan = compute_plan(&profile, &options)?;
    info!(
        "Plan computed: {} {} via {}",
        plan.agent.chosen,
        match &plan.dose {
            dose::DosePlan::Bolus(d) => format!("{:.1} mg", d.final_dose_mg),
            dose::DosePlan::Volatile(m) => format!("{:.2}% MAC target", m.target_mac_percent),
        },
        plan.route.chosen
    );

    // Create output directory if it doesn't exist
    std::fs::create_dir_all(&cli.output)?;

    // Save results
    crate::output::save_results(&plan, &cli.output)?;
    info!("Results saved to {:?}", cli.output);

    Ok(())
}
