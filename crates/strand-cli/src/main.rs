//! Strand CLI
//!
//! Drives the task kernel from the command line: runs the sensor simulation
//! and shows the effective scheduler configuration.

mod sensors;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strand_kernel::{ManualClock, Scheduler, SchedulerConfig, SystemClock};

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Cooperative task kernel driver", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sensor simulation
    Simulate {
        /// Maximum number of host ticks
        #[arg(short, long, default_value_t = 60)]
        ticks: u32,
        /// Length of one tick in milliseconds
        #[arg(long, default_value_t = 300)]
        tick_ms: u64,
        /// Advance a simulated clock instead of sleeping
        #[arg(short, long)]
        simulated: bool,
        /// Scheduler configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Do not echo task prints on stdout
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the effective scheduler configuration
    Config {
        /// Scheduler configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp(None)
        .try_init()
        .ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            ticks,
            tick_ms,
            simulated,
            config,
            quiet,
        } => {
            let mut config = load_config(config.as_deref())?;
            config.echo_prints = !quiet;
            let tick = Duration::from_millis(tick_ms);

            if simulated {
                let clock = ManualClock::new();
                let sched = Scheduler::with_config(config, clock.clone());
                simulate(sched, ticks, || clock.advance(tick))
            } else {
                let sched = Scheduler::with_config(config, SystemClock::new());
                simulate(sched, ticks, || std::thread::sleep(tick))
            }
        }

        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SchedulerConfig> {
    match path {
        Some(path) => SchedulerConfig::from_path(path)
            .with_context(|| format!("Failed to load {}", path.display())),
        None => Ok(SchedulerConfig::default()),
    }
}

/// Host loop: update the simulated environment, fire due timers, let time pass
fn simulate(mut sched: Scheduler, max_ticks: u32, mut pause: impl FnMut()) -> anyhow::Result<()> {
    let env = sensors::Environment::register(&sched)?;
    sched.create(sensors::main_task());

    println!("Running scheduler");
    let mut ticks = 0;
    while !sched.is_empty() {
        if ticks == max_ticks {
            log::warn!("Stopping after {} ticks with {} task(s) alive", ticks, sched.len());
            return Ok(());
        }
        ticks += 1;

        env.drain_energy();
        sched.tick_now()?;
        pause();
        println!("Ext var: {}", env);
    }

    println!("All tasks are dead, we better leave this place");
    Ok(())
}
