use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::Path;
use std::time::Instant;

use mogreps_pair::cli::{
    Cli, Commands, OutputFormat, PairArgs, generate_template, load_config, render_config,
};
use mogreps_pair::info::{
    get_forecast_info, print_file_info_csv, print_file_info_human, print_file_info_json,
    print_file_info_yaml,
};
use mogreps_pair::log::{
    config_echo, show_farewell_with_timing, show_greeting, show_listing, show_pairing_summary,
};
use mogreps_pair::output::write_pair;
use mogreps_pair::pairing::PairOutcome;
use mogreps_pair::storage::join_path;
use mogreps_pair::{expected_counterparts, list_archive, list_inputs, pair_listed};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    if let Err(err) = run(cli).await {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    let config_path = config_path.as_deref();

    match cli.command {
        Commands::List {
            location,
            max_files,
            storage,
        } => {
            let mut config = load_config(config_path)?;
            storage.apply(&mut config.storage);
            let max_files = max_files.unwrap_or(config.max_files);
            let (root, prefix) = match &location {
                Some(location) => (location.as_str(), ""),
                None => (config.regional_path.as_str(), config.regional_prefix.as_str()),
            };
            let names = list_archive(root, prefix, max_files, &config.storage).await?;
            print_names(&names, &cli.output_format)?;
        }

        Commands::Info {
            file,
            detailed,
            parameter,
            format,
            storage,
        } => {
            let mut config = load_config(config_path)?;
            storage.apply(&mut config.storage);
            let info = get_forecast_info(&file, parameter.as_deref(), &config).await?;
            match format.unwrap_or(cli.output_format) {
                OutputFormat::Human => print_file_info_human(&info, detailed),
                OutputFormat::Json => print_file_info_json(&info)?,
                OutputFormat::Yaml => print_file_info_yaml(&info)?,
                OutputFormat::Csv => print_file_info_csv(&info)?,
            }
        }

        Commands::Pair { args, force, dry_run } => {
            run_pair(config_path, &args, force, dry_run, cli.quiet).await?;
        }

        Commands::Template {
            template_type,
            output,
            format,
        } => {
            let rendered = render_config(&generate_template(&template_type), &format)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered).with_context(|| {
                        format!("Failed to write template to {}", path.display())
                    })?;
                    info!("Template written to {}", path.display());
                }
                None => println!("{}", rendered),
            }
        }

        Commands::Completions { shell, output } => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            match output {
                Some(path) => {
                    let mut file = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    clap_complete::generate(shell, &mut command, name, &mut file);
                }
                None => clap_complete::generate(shell, &mut command, name, &mut std::io::stdout()),
            }
        }
    }
    Ok(())
}

async fn run_pair(
    config_path: Option<&Path>,
    args: &PairArgs,
    force: bool,
    dry_run: bool,
    quiet: bool,
) -> Result<()> {
    let start_time = Instant::now();
    let config = args.apply(load_config(config_path)?);
    config.validate()?;

    if !quiet {
        show_greeting(config_path.and_then(|p| p.to_str()));
        config_echo(&config);
    }

    let (regional, global) = list_inputs(&config).await?;
    if !quiet {
        show_listing(regional.len(), global.len());
    }

    if dry_run {
        let expected = expected_counterparts(&config, &regional, &global)?;
        for (regional_file, global_file, listed) in expected {
            let status = if listed { "found" } else { "missing" };
            println!("  {} -> {} ({})", regional_file, global_file, status);
        }
        return Ok(());
    }

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(regional.len() as u64);
        let template = "{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";
        bar.set_style(ProgressStyle::with_template(template)?.progress_chars("#>-"));
        bar.set_prefix("Regional files");
        bar
    };

    let report = pair_listed(&config, &regional, &global, |outcome: &PairOutcome| {
        progress.set_message(outcome.regional_file().to_string());
        progress.inc(1);
    })
    .await?;
    progress.finish_and_clear();

    if let Some(output_dir) = &config.output_dir {
        for pair in report.pairs() {
            let (regional_path, global_path) = write_pair(pair, output_dir, &config.storage, force)
                .await
                .with_context(|| {
                    format!("Failed to export {}", join_path(output_dir, &pair.regional_file))
                })?;
            info!("Wrote {} and {}", regional_path, global_path);
        }
    }

    if !quiet {
        show_pairing_summary(&report);
        show_farewell_with_timing(start_time.elapsed());
    }
    Ok(())
}

fn print_names(names: &[String], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => {
            for name in names {
                println!("{}", name);
            }
            println!("{} files", names.len());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(names)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(names)?),
        OutputFormat::Csv => {
            println!("name");
            for name in names {
                println!("{}", name);
            }
        }
    }
    Ok(())
}
