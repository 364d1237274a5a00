//! `phenomap score` — AP and mAP for one consensus profile table.

use std::path::Path;

use phenomap_core::{
    MapParams, PValueMethod, PairPredicate, RetrievalParams, score_file, write_ap_table,
    write_map_table,
};

use super::fail;

/// Options of the score command.
pub struct ScoreCommandConfig<'a> {
    pub profiles: &'a str,
    pub multilabel_col: &'a str,
    pub null_size: usize,
    pub seed: u64,
    pub fdr: f64,
    pub batch_size: usize,
    pub p_value_method: &'a str,
    pub output_dir: &'a str,
}

fn parse_method(name: &str) -> PValueMethod {
    match name {
        "fisher" => PValueMethod::Fisher,
        _ => PValueMethod::PooledNull,
    }
}

/// Run the score command.
pub fn run(cfg: ScoreCommandConfig<'_>) {
    let retrieval = RetrievalParams {
        positive: PairPredicate::new(&[cfg.multilabel_col], &[]),
        negative: PairPredicate::new(&[], &[cfg.multilabel_col]),
        batch_size: cfg.batch_size,
        multilabel_col: Some(cfg.multilabel_col.to_string()),
    };
    let params = MapParams {
        null_size: cfg.null_size,
        threshold: cfg.fdr,
        seed: cfg.seed,
        method: parse_method(cfg.p_value_method),
    };

    let scored = score_file(Path::new(cfg.profiles), &retrieval, &params)
        .unwrap_or_else(|e| fail(&format!("scoring {}", cfg.profiles), e));

    let out = Path::new(cfg.output_dir);
    let ap_path = out.join("ap.csv");
    let map_path = out.join("map.csv");
    if let Err(e) = write_ap_table(&ap_path, &scored.ap, &scored.map.item_p_values) {
        fail("writing per-item table", e);
    }
    if let Err(e) = write_map_table(&map_path, &scored.map) {
        fail("writing aggregated table", e);
    }

    println!();
    println!(
        "{:<24} {:>8} {:>7} {:>12} {:>12}",
        "GROUP", "mAP", "ITEMS", "P", "CORRECTED P"
    );
    println!("{}", "-".repeat(67));
    for row in &scored.map.rows {
        let mark = if row.below_corrected_p { " *" } else { "" };
        println!(
            "{:<24} {:>8.4} {:>7} {:>12.3e} {:>12.3e}{mark}",
            row.key.join(","),
            row.mean_average_precision,
            row.n_items,
            row.p_value,
            row.corrected_p_value
        );
    }
    println!();
    println!(
        "{} of {} groups below corrected p < {}",
        scored.map.n_significant(),
        scored.map.rows.len(),
        cfg.fdr
    );
    println!("Per-item scores: {}", ap_path.display());
    println!("Group scores:    {}", map_path.display());
}
