use anyhow::Result;
use clap::Parser;
use qrscan::{
    CameraFacing, FrameSource, KeyAction, KeyboardInputHandler, RqrrDecoder, ScanResult,
    ScannerConfig, ScannerControllerBuilder, ScannerHandle, ScannerSnapshot, SourceCapability,
    StreamDecoder,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "qrscan")]
#[command(about = "Live camera QR code scanner")]
#[command(version)]
#[command(long_about = "Scans QR codes from a live camera feed. Start, stop and switch \
between the front and back camera from the keyboard; the camera is always released \
before another one is opened.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "qrscan.toml", help = "Path to TOML configuration file")]
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

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without opening a camera")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "PATH", help = "Write log output to this file")]
    log_file: Option<String>,

    /// Camera to start with
    #[arg(long, value_name = "FACING", help = "Initial camera: front or back")]
    facing: Option<CameraFacing>,

    /// Start scanning immediately
    #[arg(long, help = "Start scanning without waiting for a key press")]
    auto_start: bool,

    /// Exit after the first decoded code
    #[arg(long, help = "Print the first decoded code and exit")]
    exit_on_result: bool,

    /// Print results as JSON
    #[arg(long, help = "Print scan results as JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting qrscan v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match ScannerConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    if let Some(facing) = args.facing {
        config.scanner.default_facing = facing;
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
        println!("✓ Configuration is valid");
        return Ok(());
    }

    #[cfg(all(feature = "camera", target_os = "linux"))]
    let source = Arc::new(qrscan::V4l2Source::new(config.camera.clone()));
    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    let source = {
        warn!("Built without the camera feature; scanning synthetic frames");
        Arc::new(qrscan::SyntheticSource::new(&config.camera))
    };

    let result = run(source, config, &args).await?;

    if let Some(result) = result {
        print_result(&result, args.json)?;
    }

    info!("qrscan exited");
    Ok(())
}

async fn run<S: FrameSource>(
    source: Arc<S>,
    config: ScannerConfig,
    args: &Args,
) -> Result<Option<ScanResult>> {
    let decoder = Arc::new(StreamDecoder::new(
        Arc::clone(&source),
        RqrrDecoder::with_max_dimension(config.decoder.max_dimension),
        &config.decoder,
    ));

    let scanner = ScannerControllerBuilder::new()
        .config(config.scanner.clone())
        .decoder(decoder)
        .capability(SourceCapability::new(source))
        .spawn()?;

    let render_task = tokio::spawn(render(scanner.clone()));

    let keyboard = KeyboardInputHandler::new(scanner.clone());
    keyboard.start().await?;
    let quit = keyboard.quit_token();

    if args.auto_start {
        let disposition = scanner.start_preferred().await?;
        info!("Auto start: {:?}", disposition);
    }

    let result = wait_for_exit(&scanner, &quit, args.exit_on_result).await;

    info!("Shutting down scanner");
    scanner.shutdown().await;
    keyboard.stop().await?;
    render_task.abort();

    Ok(result)
}

/// Resolve on ctrl-c, the quit key, or (optionally) the first decoded code
async fn wait_for_exit(
    scanner: &ScannerHandle,
    quit: &CancellationToken,
    exit_on_result: bool,
) -> Option<ScanResult> {
    let first_result = async {
        if !exit_on_result {
            return std::future::pending().await;
        }
        match scanner.wait_for(|s| s.result.is_some()).await {
            Ok(snapshot) => snapshot.result,
            Err(e) => {
                warn!("Scanner stopped before producing a result: {}", e);
                None
            }
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Interrupt received");
            None
        }
        _ = quit.cancelled() => None,
        result = first_result => result,
    }
}

/// Print one status line per published snapshot
async fn render(scanner: ScannerHandle) {
    let mut snapshots = scanner.subscribe();
    print_status(&snapshots.borrow_and_update());

    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        print_status(&snapshot);
    }
}

fn print_status(snapshot: &ScannerSnapshot) {
    let mut line = format!(
        "[{}] preferred camera: {}",
        snapshot.state.name(),
        snapshot.preferred_facing
    );
    if let Some(facing) = snapshot.state.active_facing() {
        line.push_str(&format!(" | active: {}", facing));
    }
    if let Some(result) = &snapshot.result {
        line.push_str(&format!(" | result: {}", result.text));
    }
    if let Some(failure) = &snapshot.failure {
        line.push_str(&format!(" | {}", failure));
    }
    let keys: Vec<&str> = KeyAction::available(snapshot)
        .iter()
        .map(KeyAction::label)
        .collect();
    line.push_str(&format!(" | {}", keys.join(", ")));
    // Raw mode needs an explicit carriage return
    eprint!("{}\r\n", line);
}

fn print_result(result: &ScanResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(result)?);
    } else {
        println!("{}", result.text);
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

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
        .unwrap_or_else(|_| EnvFilter::new(format!("qrscan={}", log_level)));

    let (writer, guard) = match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };
    let ansi = args.log_file.is_none();

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# qrscan configuration file");
    println!("# Every key can be overridden from the environment, e.g.");
    println!("# QRSCAN_SCANNER__DEFAULT_FACING=front");
    println!();
    println!("{}", toml::to_string_pretty(&ScannerConfig::default())?);
    Ok(())
}
