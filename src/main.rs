/*!
 * Slotline CLI
 *
 * `slotline run` starts the supervised bot against the configured JSON slot
 * feed and user store with a dry-run portal session.
 */

use clap::{Parser, Subcommand};
use slotline::{
    booking::BookingStats,
    config::BotConfig,
    error::{Result, SlotlineError, EXIT_SUCCESS},
    logging, portal,
    priority::{load_events, PrioritizationStats},
    Supervisor,
};
use std::path::PathBuf;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "slotline")]
#[command(version, about = "Resilient appointment slot booking bot", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = "slotline.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot until interrupted
    Run,

    /// Load and validate the configuration, then exit
    ValidateConfig,

    /// Show booking and prioritization statistics
    Stats,
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = BotConfig::from_file(&cli.config)?;

    match cli.command {
        Commands::Run => run_bot(config),
        Commands::ValidateConfig => {
            println!("Configuration OK: {}", cli.config.display());
            println!("  Account:           {}", config.username);
            println!("  Priority strategy: {}", config.priority_strategy);
            println!("  Check interval:    {}s", config.check_interval);
            println!("  Rate limit:        {}/s", config.rate_limit_per_second);
            Ok(())
        }
        Commands::Stats => runtime()?.block_on(show_stats(&config)),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| SlotlineError::Other(format!("Failed to start async runtime: {}", e)))
}

fn run_bot(config: BotConfig) -> Result<()> {
    logging::init_logging(config.log_level, config.log_file.as_deref())?;

    let runtime = runtime()?;
    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Interrupt received, shutting down"),
                Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
            }
            shutdown_tx.send_replace(true);
        });

        let collaborators = portal::dry_run_collaborators(&config);
        Supervisor::new(config, collaborators).run(shutdown_rx).await
    })
}

async fn show_stats(config: &BotConfig) -> Result<()> {
    let booking = BookingStats::load(&config.booking_stats_file).await?;
    println!("Booking");
    println!("  Attempts:   {}", booking.total_attempts);
    println!("  Successful: {}", booking.successful_bookings);
    println!("  Failed:     {}", booking.failed_bookings);
    println!("  Success:    {:.1}%", booking.success_rate() * 100.0);

    let events = load_events(&config.prioritization_history_file)
        .await?
        .unwrap_or_default();
    let priority = PrioritizationStats::from_events(&events);
    println!("Prioritization");
    println!("  Runs:       {}", priority.total_prioritizations);
    println!(
        "  Avg time:   {:.3}ms",
        priority.average_execution_time * 1000.0
    );
    if let Some(last) = priority.last_prioritization {
        println!(
            "  Last run:   {} ({} of {} slots kept, {})",
            last.timestamp.to_rfc3339(),
            last.output_count,
            last.input_count,
            last.strategy
        );
    }
    Ok(())
}
