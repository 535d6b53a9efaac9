//! # CLI Integration Tests
//!
//! Argument parsing tests for the command-line interface, including
//! subcommands, global flags and error handling.

#[cfg(test)]
mod tests {
    use clap::Parser;
    use std::path::PathBuf;

    use crate::cli::{Cli, Commands, ConfigFormat, ENV_TEST_MUTEX, OutputFormat, TemplateType};

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Test basic CLI argument parsing
    #[test]
    fn test_cli_help() {
        let result = Cli::try_parse_from(["mogreps-pair", "--help"]);
        assert!(result.is_err()); // --help causes early exit with "error"

        let error = result.unwrap_err();
        assert!(error.to_string().contains("Mogreps"));
    }

    /// Test version argument
    #[test]
    fn test_cli_version() {
        let result = Cli::try_parse_from(["mogreps-pair", "--version"]);
        assert!(result.is_err()); // --version causes early exit
    }

    /// Test global flags
    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "mogreps-pair",
            "--verbose",
            "--output-format",
            "json",
            "--config",
            "/path/to/pairing.yaml",
            "template",
            "local",
        ]);

        assert!(cli.verbose);
        assert_eq!(cli.output_format, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/pairing.yaml")));
    }

    /// Test pair command argument parsing
    #[test]
    fn test_pair_command() {
        let _guard = env_guard();
        let cli = Cli::parse_from([
            "mogreps-pair",
            "pair",
            "-n",
            "air_temperature",
            "--regional-path",
            "s3://mogreps-uk/",
            "--global-path",
            "s3://mogreps-g/",
            "--max-files",
            "5",
            "-o",
            "pairs/",
            "--region",
            "eu-west-1",
            "--force",
            "--dry-run",
        ]);

        if let Commands::Pair { args, force, dry_run } = &cli.command {
            assert_eq!(args.parameter.as_deref(), Some("air_temperature"));
            assert_eq!(args.regional_path.as_deref(), Some("s3://mogreps-uk/"));
            assert_eq!(args.global_path.as_deref(), Some("s3://mogreps-g/"));
            assert_eq!(args.max_files, Some(5));
            assert_eq!(args.output_dir.as_deref(), Some("pairs/"));
            assert_eq!(args.storage.region.as_deref(), Some("eu-west-1"));
            assert!(force);
            assert!(dry_run);
        } else {
            panic!("Expected Pair command");
        }
    }

    /// Test that file values survive when the command line is silent
    #[test]
    fn test_pair_command_merges_config() {
        let _guard = env_guard();
        let cli = Cli::parse_from([
            "mogreps-pair",
            "pair",
            "--global-prefix",
            "prods_op_mogreps-g2",
        ]);
        let Commands::Pair { args, .. } = &cli.command else {
            panic!("Expected Pair command");
        };

        let base =
            crate::config::PairingConfig::from_json(r#"{"parameter": "rainfall_rate"}"#).unwrap();
        let merged = args.apply(base);
        assert_eq!(merged.global_prefix, "prods_op_mogreps-g2");
        if std::env::var("MOGREPS_PARAMETER").is_err() {
            assert_eq!(merged.parameter, "rainfall_rate");
        }
    }

    /// Test list command parsing
    #[test]
    fn test_list_command() {
        let _guard = env_guard();
        let cli = Cli::parse_from([
            "mogreps-pair",
            "list",
            "s3://mogreps-uk/prods_op_mogreps-uk",
            "--max-files",
            "20",
            "--anonymous",
        ]);

        if let Commands::List {
            location,
            max_files,
            storage,
        } = &cli.command
        {
            assert_eq!(location.as_deref(), Some("s3://mogreps-uk/prods_op_mogreps-uk"));
            assert_eq!(max_files, &Some(20));
            assert!(storage.anonymous);
        } else {
            panic!("Expected List command");
        }
    }

    /// Test invalid file counts
    #[test]
    fn test_invalid_max_files() {
        let result = Cli::try_parse_from(["mogreps-pair", "list", "--max-files", "0"]);
        assert!(result.is_err());

        let result = Cli::try_parse_from(["mogreps-pair", "pair", "--max-files", "lots"]);
        assert!(result.is_err());
    }

    /// Test info command parsing
    #[test]
    fn test_info_command() {
        let cli = Cli::parse_from([
            "mogreps-pair",
            "info",
            "prods_op_mogreps-uk_20160107_03_00_003.nc",
            "--detailed",
            "-n",
            "air_temperature",
            "--format",
            "yaml",
        ]);

        if let Commands::Info {
            file,
            detailed,
            parameter,
            format,
            ..
        } = &cli.command
        {
            assert_eq!(file, "prods_op_mogreps-uk_20160107_03_00_003.nc");
            assert!(detailed);
            assert_eq!(parameter, &Some("air_temperature".to_string()));
            assert_eq!(format, &Some(OutputFormat::Yaml));
        } else {
            panic!("Expected Info command");
        }
    }

    /// Test info requires a file
    #[test]
    fn test_info_missing_file() {
        assert!(Cli::try_parse_from(["mogreps-pair", "info"]).is_err());
    }

    /// Test template command parsing
    #[test]
    fn test_template_command() {
        let cli = Cli::parse_from([
            "mogreps-pair",
            "template",
            "anonymous",
            "--output",
            "pairing.yaml",
            "--format",
            "yaml",
        ]);

        if let Commands::Template {
            template_type,
            output,
            format,
        } = &cli.command
        {
            assert_eq!(template_type, &TemplateType::Anonymous);
            assert_eq!(output, &Some(PathBuf::from("pairing.yaml")));
            assert_eq!(format, &ConfigFormat::Yaml);
        } else {
            panic!("Expected Template command");
        }
    }

    /// Test template type enum
    #[test]
    fn test_template_types() {
        let templates = [
            ("local", TemplateType::Local),
            ("s3", TemplateType::S3),
            ("anonymous", TemplateType::Anonymous),
        ];

        for (name, expected) in templates {
            let cli = Cli::parse_from(["mogreps-pair", "template", name]);
            if let Commands::Template { template_type, .. } = &cli.command {
                assert_eq!(template_type, &expected);
            } else {
                panic!("Expected Template command");
            }
        }
        assert!(Cli::try_parse_from(["mogreps-pair", "template", "weather"]).is_err());
    }

    /// Test output format enum
    #[test]
    fn test_output_format_values() {
        let formats = [
            ("human", OutputFormat::Human),
            ("json", OutputFormat::Json),
            ("yaml", OutputFormat::Yaml),
            ("csv", OutputFormat::Csv),
        ];

        for (name, expected) in formats {
            let cli = Cli::parse_from([
                "mogreps-pair",
                "--output-format",
                name,
                "template",
                "local",
            ]);
            assert_eq!(cli.output_format, expected);
        }
    }

    /// Test completions command parsing
    #[test]
    fn test_completions_command() {
        let cli = Cli::parse_from(["mogreps-pair", "completions", "zsh", "-o", "_mogreps-pair"]);
        if let Commands::Completions { shell, output } = &cli.command {
            assert_eq!(*shell, clap_complete::Shell::Zsh);
            assert_eq!(output, &Some(PathBuf::from("_mogreps-pair")));
        } else {
            panic!("Expected Completions command");
        }
    }

    /// Test conflicting verbose and quiet flags
    #[test]
    fn test_verbose_quiet_conflict() {
        let result =
            Cli::try_parse_from(["mogreps-pair", "--verbose", "--quiet", "info", "test.nc"]);
        assert!(result.is_err());

        let cli_verbose = Cli::parse_from(["mogreps-pair", "--verbose", "info", "test.nc"]);
        assert!(cli_verbose.verbose);
        assert!(!cli_verbose.quiet);

        let cli_quiet = Cli::parse_from(["mogreps-pair", "--quiet", "info", "test.nc"]);
        assert!(!cli_quiet.verbose);
        assert!(cli_quiet.quiet);
    }

    /// Test global flags after the subcommand
    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "mogreps-pair",
            "info",
            "test.nc",
            "-q",
            "--output-format",
            "csv",
        ]);
        assert!(cli.quiet);
        assert_eq!(cli.output_format, OutputFormat::Csv);
    }
}
