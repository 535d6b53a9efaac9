use crate::config::PairingConfig;
use crate::pairing::PairingReport;
use std::time::Duration;

pub fn show_greeting(config_path: Option<&str>) {
    println!("=== Mogreps Forecast Pairing ===");
    if let Some(path) = config_path {
        println!("Loading configuration from: {}", path);
    }
}

pub fn config_echo(config: &PairingConfig) {
    println!("\nConfiguration:");
    println!("  Parameter: {}", config.parameter);
    println!("  Regional archive: {}{}", config.regional_path, config.regional_prefix);
    println!("  Global archive: {}", config.global_path);
    println!("  Max files: {}", config.max_files);
    if let Some(dir) = &config.output_dir {
        println!("  Parquet output: {}", dir);
    }
    match &config.storage.endpoint_url {
        Some(endpoint) => println!("  S3: {} ({})", config.storage.region, endpoint),
        None => println!("  S3: {}", config.storage.region),
    }
}

pub fn show_listing(regional: usize, global: usize) {
    println!("\nListed {} regional and {} global files", regional, global);
}

pub fn show_pairing_summary(report: &PairingReport) {
    println!("\nPairing Results:");
    println!("  Paired: {}", report.paired_count());
    println!("  Skipped: {}", report.skipped_count());
    for (file, reason) in report.skipped() {
        println!("    {}: {}", file, reason);
    }
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    println!("\n=== Pairing completed in {:.2}s ===", elapsed.as_secs_f64());
}
