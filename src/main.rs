use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use tilelaunch::config::default_config_path;
use tilelaunch::geometry::{self, GeometryStrategy};
use tilelaunch::raise::host_raiser;
use tilelaunch::{ClientCommand, Config, LaunchPlan, Result, RunReport, Supervisor, Timing};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "tilelaunch")]
#[command(about = "Launch several client instances in a tiled layout and supervise them")]
struct Cli {
    #[arg(
        default_value_t = 2,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Number of client instances"
    )]
    count: u32,

    #[arg(short, long, help = "Configuration file path")]
    config: Option<PathBuf>,

    #[arg(long, help = "Simulated network lag passed to every client (ms)")]
    lag_ms: Option<u64>,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..), help = "Windows per row")]
    columns: Option<u32>,

    #[arg(long, conflicts_with = "measured", help = "Assume this display scale factor")]
    scale: Option<f64>,

    #[arg(long, help = "Measure the display scale factor")]
    measured: bool,

    #[arg(long, help = "Client program to launch")]
    program: Option<String>,

    #[arg(long, help = "Server address passed to every client")]
    server: Option<String>,

    #[arg(long, help = "Delay between launches (ms)")]
    stagger_ms: Option<u64>,

    #[arg(long, help = "Delay before raising client windows (ms)")]
    settle_ms: Option<u64>,

    #[arg(long, help = "Do not raise client windows after launch")]
    no_raise: bool,

    #[arg(long, help = "Print the launch plan without starting anything")]
    dry_run: bool,

    #[arg(short, long, help = "Enable debug logging")]
    verbose: bool,
}

#[derive(Debug, Clone, Copy)]
enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    fn exit_code(self) -> ExitCode {
        match self {
            Self::Interrupt => ExitCode::from(130),
            Self::Terminate => ExitCode::from(143),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let screen = {
        let probe = geometry::probe_for(&config.geometry);
        geometry::resolve(probe.as_ref(), config.geometry.strategy)?
    };
    let count = cli.count as usize;

    println!(
        "Physical resolution: {}x{}",
        screen.physical_width, screen.physical_height
    );
    println!(
        "Logical resolution: {}x{}",
        screen.logical_width, screen.logical_height
    );
    println!(
        "Scale factor: {:.3} ({})",
        screen.scale_factor,
        strategy_label(config.geometry.strategy)
    );
    println!("Instances: {}", count);

    let plan = LaunchPlan::new(count, &config.layout, &screen);
    for placement in plan.iter() {
        println!("  {}", placement);
    }

    let command = ClientCommand::from_config(&config);
    if cli.dry_run {
        for placement in plan.iter() {
            println!("  {}", command.describe(placement));
        }
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    let listener = spawn_signal_listener(cancel.clone())?;

    let mut supervisor = Supervisor::new(command, Timing::from(&config.timing), cancel);
    if !cli.no_raise {
        supervisor = supervisor.with_raiser(host_raiser(), &config.client.process_name);
    }

    let report = supervisor.run(&plan).await;
    print_summary(&report);

    if report.interrupted {
        let signal = listener.await?;
        info!("Shut down after {:?}", signal);
        return Ok(signal.exit_code());
    }

    listener.abort();
    Ok(ExitCode::SUCCESS)
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(lag_ms) = cli.lag_ms {
        config.client.lag_ms = lag_ms;
    }
    if let Some(columns) = cli.columns {
        config.layout.columns = columns;
    }
    if let Some(factor) = cli.scale {
        config.geometry.strategy = GeometryStrategy::AssumedScale { factor };
    } else if cli.measured {
        config.geometry.strategy = GeometryStrategy::Measured;
    }
    if let Some(program) = &cli.program {
        config.client.program = program.clone();
    }
    if let Some(server) = &cli.server {
        config.client.server = Some(server.clone());
    }
    if let Some(stagger_ms) = cli.stagger_ms {
        config.timing.stagger_ms = stagger_ms;
    }
    if let Some(settle_ms) = cli.settle_ms {
        config.timing.settle_ms = settle_ms;
    }
}

fn strategy_label(strategy: GeometryStrategy) -> &'static str {
    match strategy {
        GeometryStrategy::Measured => "measured",
        GeometryStrategy::AssumedScale { .. } => "assumed",
    }
}

fn print_summary(report: &RunReport) {
    println!(
        "Spawned {} instance(s), {} failed to start",
        report.spawned.len(),
        report.failed.len()
    );
    if !report.failed.is_empty() {
        warn!("Instances that failed to start: {:?}", report.failed);
    }
    if report.interrupted {
        println!("Terminated instances: {:?}", report.terminated);
        if !report.unterminated.is_empty() {
            warn!("Could not terminate instances: {:?}", report.unterminated);
        }
    }
}

/// Cancel `cancel` on SIGINT or SIGTERM and report which one arrived.
///
/// The handlers are registered before this returns, so no signal can reach
/// the default disposition once children start.
#[cfg(unix)]
fn spawn_signal_listener(cancel: CancellationToken) -> Result<JoinHandle<ShutdownSignal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        let signal = tokio::select! {
            _ = interrupt.recv() => ShutdownSignal::Interrupt,
            _ = terminate.recv() => ShutdownSignal::Terminate,
        };
        info!("Received {:?}, stopping all instances", signal);
        cancel.cancel();
        signal
    }))
}

#[cfg(windows)]
fn spawn_signal_listener(cancel: CancellationToken) -> Result<JoinHandle<ShutdownSignal>> {
    let mut interrupt = tokio::signal::windows::ctrl_c()?;

    Ok(tokio::spawn(async move {
        interrupt.recv().await;
        info!("Received {:?}, stopping all instances", ShutdownSignal::Interrupt);
        cancel.cancel();
        ShutdownSignal::Interrupt
    }))
}
