//! `phenomap run` — the full modality x pipeline loop.

use std::path::{Path, PathBuf};

use phenomap_core::{PipelineConfig, persist, run_all};

use super::fail;

/// Run the run command.
pub fn run(config_path: Option<&str>, output: Option<&str>, fail_fast: bool) {
    let config = match config_path {
        Some(path) => PipelineConfig::load(Path::new(path))
            .unwrap_or_else(|e| fail(&format!("loading {path}"), e)),
        None => PipelineConfig::default(),
    };
    let output = output.map_or_else(|| config.output_path(), PathBuf::from);

    let report = run_all(&config, fail_fast).unwrap_or_else(|e| fail("run aborted", e));
    if let Err(e) = persist(&config, &report, &output) {
        fail("writing results", e);
    }

    println!();
    println!("{:<24} {:<10} {:>6}  STATUS", "PROFILE TYPE", "MODALITY", "ROWS");
    println!("{}", "-".repeat(56));
    for outcome in &report.outcomes {
        let status = outcome.error.as_deref().unwrap_or("ok");
        println!(
            "{:<24} {:<10} {:>6}  {status}",
            outcome.profile_type, outcome.modality, outcome.rows
        );
    }
    println!();
    println!(
        "{} rows written to {} ({} ms)",
        report.results.len(),
        output.display(),
        report.duration_ms
    );

    if report.n_failed() > 0 {
        eprintln!(
            "{} of {} configurations failed",
            report.n_failed(),
            report.outcomes.len()
        );
        std::process::exit(1);
    }
}
