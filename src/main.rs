use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use device_state_monitor::config::ConfigLoader;
use device_state_monitor::logging::{self, LoggingConfig};
use device_state_monitor::system::{PlatformAudioSystem, PlatformWifiSystem, StandardFileSystem};
use device_state_monitor::{
    AudioMonitor, Config, DispatchBridge, MonitorService, StateChange, WifiMonitor,
};

type Loader = ConfigLoader<StandardFileSystem>;

#[derive(Parser)]
#[command(name = "device-state-monitor")]
#[command(about = "WiFi and audio state monitor that mutes audio away from a trusted network")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current network and audio state
    Status,
    /// Print every state change until interrupted (the agent stays off)
    Watch,
    /// Set the default output volume
    SetVolume {
        /// Volume in percent (0-100)
        #[arg(allow_negative_numbers = true)]
        percent: i32,
    },
    /// Toggle mute on the default output device
    ToggleMute,
    /// Mute the default output device
    Mute,
    /// Unmute the default output device
    Unmute,
    /// Validate configuration file
    CheckConfig,
    /// Run monitors and the policy agent until SIGINT/SIGTERM (default)
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::new_production(path.clone()),
        None => ConfigLoader::new_with_default_path()?,
    };

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => run_daemon(&loader, cli.verbose).await,
        Commands::Status => {
            let _logging = console_logging(cli.verbose)?;
            show_status(&loader)
        }
        Commands::Watch => {
            let _logging = console_logging(cli.verbose)?;
            watch(&loader).await
        }
        Commands::SetVolume { percent } => {
            let _logging = console_logging(cli.verbose)?;
            audio_monitor()
                .set_volume(percent)
                .with_context(|| format!("Failed to set volume to {}", percent))?;
            println!("Volume set to {}%", percent);
            Ok(())
        }
        Commands::ToggleMute => {
            let _logging = console_logging(cli.verbose)?;
            let muted = audio_monitor().toggle_mute().context("Failed to toggle mute")?;
            println!("{}", if muted { "Muted" } else { "Unmuted" });
            Ok(())
        }
        Commands::Mute => {
            let _logging = console_logging(cli.verbose)?;
            set_mute(true)
        }
        Commands::Unmute => {
            let _logging = console_logging(cli.verbose)?;
            set_mute(false)
        }
        Commands::CheckConfig => {
            let _logging = console_logging(cli.verbose)?;
            check_config(&loader)
        }
    }
}

/// One-shot commands log to stderr only, warnings and up unless verbose.
fn console_logging(verbose: bool) -> Result<(Option<WorkerGuard>, Option<PathBuf>)> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    logging::initialize_logging(LoggingConfig::console(level))
}

fn audio_monitor() -> AudioMonitor<PlatformAudioSystem> {
    AudioMonitor::new(PlatformAudioSystem::new(), DispatchBridge::inline())
}

fn set_mute(muted: bool) -> Result<()> {
    let confirmed = audio_monitor()
        .set_mute(muted)
        .with_context(|| format!("Failed to {}", if muted { "mute" } else { "unmute" }))?;
    println!("{}", if confirmed { "Muted" } else { "Unmuted" });
    Ok(())
}

fn show_status(loader: &Loader) -> Result<()> {
    let config = loader.load_config()?;

    let wifi = WifiMonitor::new(
        PlatformWifiSystem::new(config.wifi.poll_interval()),
        DispatchBridge::inline(),
    );
    if let Err(kind) = wifi.initialize() {
        warn!("Network state unavailable: {}", kind);
    }
    let audio = audio_monitor();

    println!("Network: {}", wifi.current());
    println!("Audio:   {}", audio.current());
    if config.agent.allowed_ssid.is_empty() {
        println!("Agent:   no allow-listed network configured");
    } else {
        println!(
            "Agent:   {} (allow-listed network '{}')",
            if config.agent.enabled { "enabled" } else { "disabled" },
            config.agent.allowed_ssid
        );
    }
    Ok(())
}

async fn watch(loader: &Loader) -> Result<()> {
    let mut config = loader.load_config()?;
    config.agent.enabled = false;

    let mut service = MonitorService::new_production(config)?;
    let _changes = service.model().subscribe(|change| match change {
        StateChange::Network(network) => println!("network: {}", network),
        StateChange::Audio(audio) => println!("audio:   {}", audio),
    });

    service.start()?;
    let (network, audio) = service.model().snapshot();
    println!("network: {}", network);
    println!("audio:   {}", audio);
    println!("Watching for changes, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl+C")?;
    service.shutdown();
    Ok(())
}

fn check_config(loader: &Loader) -> Result<()> {
    println!("Configuration: {}", loader.get_config_path().display());
    let config: Config = loader.load_config()?;

    println!("  ✓ Configuration file parsed and validated");
    println!("  ✓ Dispatch: {:?}", config.general.dispatch);
    println!("  ✓ WiFi poll interval: {} ms", config.wifi.poll_interval_ms);
    println!(
        "  ✓ Audio: {:?} ({} ms poll interval)",
        config.audio.mode, config.audio.poll_interval_ms
    );
    if config.agent.allowed_ssid.is_empty() {
        println!("  ! Agent: no allowed_ssid, agent cannot be enabled");
    } else {
        println!(
            "  ✓ Agent: '{}' ({})",
            config.agent.allowed_ssid,
            if config.agent.enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

async fn run_daemon(loader: &Loader, verbose: bool) -> Result<()> {
    let config = loader.load_config()?;

    let level = if verbose {
        Level::DEBUG
    } else {
        logging::parse_level(&config.general.log_level)
    };
    let (_guard, log_dir) = logging::initialize_logging(LoggingConfig {
        level,
        ..LoggingConfig::default()
    })?;
    if let Some(dir) = &log_dir {
        info!("Logging to {}", dir.display());
        if let Err(e) = logging::cleanup_old_logs(dir, 7) {
            warn!("Failed to clean up old logs: {:#}", e);
        }
    }

    let mut service = MonitorService::new_production(config)?;
    service.start()?;
    service.run(loader).await
}
