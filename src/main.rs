use anyhow::Result;
use clap::Parser;
use smartbridge::{BridgeConfig, BridgeOrchestrator, RunOptions};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "smartbridge")]
#[command(about = "Hand gesture and voice command bridge for smart home actuators")]
#[command(version)]
#[command(long_about = "Reads hand pose frames and voice actions as JSON lines, decides \
between static and dynamic gesture recognition, and forwards debounced commands to the \
gesture and voice actuator endpoints.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "smartbridge.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR", help = "Directory for daily rolling log files")]
    log_file: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the bridge")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Log commands instead of sending them
    #[arg(long, help = "Perform dry run - recognize as usual but only log outgoing commands")]
    dry_run: bool,

    /// Input source, overriding the configuration
    #[arg(short, long, value_name = "PATH", help = "JSON-lines input file, or - for stdin")]
    input: Option<String>,

    /// Enable keyboard control
    #[arg(long, help = "Enable keyboard control: r resets, d toggles diagnostics, q quits")]
    keyboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let guard = init_logging(&args)?;

    info!("Starting smartbridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match BridgeConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(input) = &args.input {
        config.input.source = input.clone();
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    if args.keyboard && config.input.source == "-" {
        warn!("Keyboard control and stdin input share the terminal");
    }

    let options = RunOptions {
        dry_run: args.dry_run,
        keyboard: args.keyboard,
    };

    let mut orchestrator = BridgeOrchestrator::new(config, options)
        .await
        .map_err(|e| {
            error!("Failed to create orchestrator: {}", e);
            e
        })?;

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize bridge: {}", e);
        e
    })?;

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start bridge: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Bridge error during execution: {}", e);
        e
    })?;

    info!("smartbridge exited with code: {}", exit_code);

    // process::exit skips destructors; flush the file writer first
    drop(guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
    };

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("smartbridge={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![fmt_layer];

    let guard = match &args.log_file {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "smartbridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# smartbridge configuration file");
    println!("# Every option with its default value. Environment variables override");
    println!("# the file, e.g. SMARTBRIDGE_TRANSPORT__KIND=http");
    println!();
    println!("{}", toml::to_string_pretty(&BridgeConfig::default())?);
    Ok(())
}
