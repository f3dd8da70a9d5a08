use clap::Parser;
use substances_hf::utils::error::ErrorSeverity;
use substances_hf::utils::{logger, validation::Validate};
use substances_hf::{BuildConfig, BuildEngine, CliConfig, LocalStorage, SubstancePipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting substances-hf");
    tracing::info!("📁 Loading configuration from: {}", cli.config.display());

    let mut config = match BuildConfig::from_file(&cli.config) {
        Ok(config) => config.with_data_root(cli.data_root()),
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", cli.config.display(), e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if let Some(output) = &cli.output {
        config.output.path = output.clone();
        tracing::info!("🔧 Output directory overridden to: {}", output);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(exit_code(e.severity()));
    }
    tracing::debug!("Build config: {:?}", config);

    display_config_summary(&config, &cli);

    if cli.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be read or written");
        return Ok(());
    }

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let pipeline = SubstancePipeline::new(LocalStorage::new(""), config);
    let engine = BuildEngine::new_with_monitoring(pipeline, cli.monitor);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Build completed successfully!");
            println!("✅ Build completed successfully!");
            println!("📁 Output saved to: {}", output_path);
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                "❌ Build failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(exit_code(e.severity()));
        }
    }
}

fn exit_code(severity: ErrorSeverity) -> i32 {
    match severity {
        ErrorSeverity::Low | ErrorSeverity::High => 1,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::Critical => 3,
    }
}

fn display_config_summary(config: &BuildConfig, cli: &CliConfig) {
    println!("📋 Configuration Summary:");
    println!("  Pipeline: {}", config.pipeline.name);
    if let Some(description) = &config.pipeline.description {
        println!("  Description: {}", description);
    }
    println!("  Packagings: {}", config.reference.packagings);
    println!("  Compositions: {}", config.reference.compositions);
    println!("  Allow-list: {}", config.reference.allow_list);
    println!("  Aliases: {}", config.aliases.len());
    println!("  Categories: {}", config.categories.len());
    println!("  Overlap policy: {:?}", config.study.overlap);

    for dataset in [&config.datasets.open_medic, &config.datasets.open_phmev]
        .into_iter()
        .flatten()
    {
        println!("  Dataset: {}", dataset.name);
        for (year, path) in &dataset.years {
            println!("    {} -> {}", year, path);
        }
    }

    println!("  Output: {}", config.output_file());
    if cli.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
    println!();
}
