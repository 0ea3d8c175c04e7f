use clap::{CommandFactory, Parser};
use roombook::{Application, Config, config::Args, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry()?;

    tracing::debug!("{:?}", args);

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let app = Application::new(config, args.offline).await?;
    if let Err(err) = app.run(command).await {
        tracing::debug!(error = ?err, code = err.code(), "Command failed");
        eprintln!("error: {}", err.user_message());
        std::process::exit(1);
    }
    Ok(())
}
