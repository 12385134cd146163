use clap::Parser;
use mastr_etl::config::cli::{Command, FetchArgs};
use mastr_etl::core::carrier::CarrierResolver;
use mastr_etl::core::detail::lookup_unit;
use mastr_etl::core::executor::RequestExecutor;
use mastr_etl::core::Storage;
use mastr_etl::utils::error::ErrorSeverity;
use mastr_etl::utils::{logger, validation::Validate};
use mastr_etl::{
    fetch_registry, CancellationToken, CliConfig, EtlEngine, EtlError, FetchSettings,
    LocalStorage, RegistryPipeline, StdoutStorage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    if config.log_json {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting mastr-etl CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("🛑 Interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    if let Err(e) = run(&config, &cancel).await {
        tracing::error!(
            "❌ mastr-etl failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 130,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        std::process::exit(exit_code);
    }

    Ok(())
}

async fn run(config: &CliConfig, cancel: &CancellationToken) -> Result<(), EtlError> {
    let mut settings = config.load_settings()?;

    match &config.command {
        Command::Fetch(args) => {
            args.apply_overrides(&mut settings);
            settings.validate()?;
            fetch(args, settings, cancel).await
        }
        Command::Detail(args) => {
            settings.validate()?;
            let executor = RequestExecutor::new(&settings)?;
            match lookup_unit(&executor, &settings, &args.mastr, cancel).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => {
                    tracing::warn!("No unit registered under {}", args.mastr);
                    println!("null");
                }
            }
            Ok(())
        }
        Command::Carriers => {
            settings.validate()?;
            let executor = RequestExecutor::new(&settings)?;
            let options = CarrierResolver::new(&executor, &settings)
                .list_options(cancel)
                .await?;
            for option in options {
                println!("{}\t{}", option.value, option.name);
            }
            Ok(())
        }
    }
}

async fn fetch(
    args: &FetchArgs,
    settings: FetchSettings,
    cancel: &CancellationToken,
) -> Result<(), EtlError> {
    let request = args.to_request()?;

    match &args.output {
        Some(path) => {
            let pipeline = RegistryPipeline::new(
                LocalStorage::new("."),
                settings,
                request,
                cancel.clone(),
            )?
            .with_output_name(path.display().to_string());

            let output_path = EtlEngine::new(pipeline).run().await?;
            tracing::info!("✅ Export completed successfully!");
            tracing::info!("📁 Output saved to: {}", output_path);
        }
        None => {
            let output = fetch_registry(&settings, &request, cancel).await?;
            StdoutStorage.write_file("", output.body.as_bytes()).await?;
        }
    }
    Ok(())
}
