//! `phenomap config` — print the default configuration.

use phenomap_core::PipelineConfig;

/// Run the config command.
pub fn run() {
    match serde_json::to_string_pretty(&PipelineConfig::default()) {
        Ok(json) => println!("{json}"),
        Err(e) => super::fail("serializing default configuration", e),
    }
}
