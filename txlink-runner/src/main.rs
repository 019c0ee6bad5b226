//! Transmitter Link Runner
//!
//! Runs the mixer loop against simulated link hardware for a bounded time
//! and reports what the scheduler did.
//!
//! ```text
//! txlink [SETTINGS] [--write-defaults]
//! ```
//!
//! Without a path the settings come from `$XDG_CONFIG_HOME/txlink/settings.json`.

mod settings;

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use txlink_protocol::ModuleSlot;
use txlink_sched::{
    BindInformation, BindOutcome, LinkError, LinkEvent, LinkHandle, LinkStatus, MixerExit,
};
use txlink_sim::SimLinkBuilder;

use settings::RunnerSettings;

/// How often the runner looks for bind candidates
const BIND_POLL: Duration = Duration::from_millis(50);

/// How often the runner checks whether the mixer task ended on its own
const EXIT_POLL: Duration = Duration::from_millis(20);

struct Args {
    settings: Option<PathBuf>,
    write_defaults: bool,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Args {
            settings: None,
            write_defaults: false,
        };
        for arg in args {
            match arg.as_str() {
                "--write-defaults" => parsed.write_defaults = true,
                flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
                path if parsed.settings.is_none() => parsed.settings = Some(PathBuf::from(path)),
                extra => bail!("Unexpected argument {}", extra),
            }
        }
        Ok(parsed)
    }
}

/// What a run produced
#[derive(Debug)]
struct RunReport {
    exit: MixerExit,
    status: LinkStatus,
    frames: [u64; 2],
    watchdog_kicks: u64,
    hook_runs: u64,
    events: u64,
    bind: Option<Result<BindOutcome, LinkError>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "txlink=info,txlink_protocol=info,txlink_sched=info,txlink_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    let path = match args.settings {
        Some(path) => path,
        None => RunnerSettings::default_path().context("Could not determine settings path")?,
    };

    if args.write_defaults {
        RunnerSettings::default().save(&path)?;
        info!("Wrote default settings to {}", path.display());
        return Ok(());
    }

    let settings = RunnerSettings::load(&path)?;
    info!("Starting txlink for {} ms", settings.run_ms);

    let interrupted = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler; run to the deadline
            std::future::pending::<()>().await;
        }
    };
    let report = run(settings, interrupted).await?;
    print_report(&report);
    Ok(())
}

/// Run a simulated link until `run_ms` passes, `interrupt` completes or the
/// mixer task powers off
async fn run(settings: RunnerSettings, interrupt: impl Future<Output = ()>) -> Result<RunReport> {
    let mut link = SimLinkBuilder::new(settings.link.clone())
        .model(settings.model.clone())
        .mixer_duration_us(settings.mixer_duration_us)
        .build()
        .context("Failed to build simulated link")?;

    let (event_tx, event_rx) = mpsc::channel(settings.link.event_queue_depth.max(1));
    let event_log = tokio::spawn(log_events(event_rx));

    let running = link.start(Some(event_tx)).context("Failed to start link")?;
    link.handle.resume_pulses();

    let bind = settings
        .bind
        .map(|slot| tokio::spawn(auto_bind(link.handle.clone(), slot)));

    let deadline = sleep(Duration::from_millis(settings.run_ms));
    tokio::pin!(deadline);
    tokio::pin!(interrupt);
    let mut exit_poll = interval(EXIT_POLL);

    let exit = loop {
        tokio::select! {
            _ = &mut deadline => break running.stop().await?,
            _ = &mut interrupt => {
                warn!("Interrupted, stopping link");
                break running.stop().await?;
            }
            _ = exit_poll.tick() => {
                if running.is_finished() {
                    break running.wait().await?;
                }
            }
        }
    };

    let bind = match bind {
        Some(task) if task.is_finished() => Some(task.await.context("Bind task failed")?),
        Some(task) => {
            task.abort();
            warn!("Bind did not finish before the run ended");
            None
        }
        None => None,
    };

    let status = link.handle.status();
    // The only sender went away with the mixer task
    let events = event_log.await.context("Event log task failed")?;

    Ok(RunReport {
        exit,
        status,
        frames: ModuleSlot::ALL.map(|slot| link.drivers[slot.index()].frames_sent()),
        watchdog_kicks: link.watchdog.get(),
        hook_runs: link.hook_runs.get(),
        events,
        bind,
    })
}

async fn log_events(mut events: mpsc::Receiver<LinkEvent>) -> u64 {
    let mut count = 0;
    while let Some(event) = events.recv().await {
        count += 1;
        match event {
            LinkEvent::TriggerTimeout { .. } => tracing::debug!("{:?}", event),
            _ => info!("Link event: {:?}", event),
        }
    }
    count
}

/// Bind `slot` and pick the first receiver that answers
async fn auto_bind(handle: LinkHandle, slot: ModuleSlot) -> Result<BindOutcome, LinkError> {
    let destination = Arc::new(Mutex::new(BindInformation::default()));
    let mut ticket = handle.start_bind(slot, Arc::clone(&destination))?;
    let mut poll = interval(BIND_POLL);

    loop {
        poll.tick().await;
        if let Some(outcome) = ticket.try_outcome() {
            return outcome;
        }

        let mut info = destination.lock().unwrap_or_else(PoisonError::into_inner);
        if info.selected.is_none() && !info.candidates.is_empty() {
            info!("{} bind: picking {}", slot, info.candidates[0]);
            info.selected = Some(0);
        }
    }
}

fn print_report(report: &RunReport) {
    let diagnostics = &report.status.diagnostics;

    println!("Exit: {:?}", report.exit);
    for slot in &report.status.slots {
        println!(
            "{:>8}: {:<12} mode {:<16} period {:>6} us, {} frames",
            slot.slot.name(),
            slot.protocol.name(),
            format!("{:?}", slot.mode),
            slot.period_us,
            report.frames[slot.slot.index()],
        );
    }
    println!(
        "Cycles: {} ({} computed, {} trigger timeouts)",
        diagnostics.cycles, diagnostics.computed_cycles, diagnostics.trigger_timeouts
    );
    println!(
        "Mixer duration: last {} us, max {} us",
        diagnostics.last_duration_us, diagnostics.max_duration_us
    );
    println!(
        "Watchdog kicks: {}, hook runs: {}, events: {}",
        report.watchdog_kicks, report.hook_runs, report.events
    );
    match &report.bind {
        Some(Ok(BindOutcome::Bound { receiver })) => println!("Bound to {}", receiver),
        Some(Ok(BindOutcome::Failed { reason })) => println!("Bind failed: {}", reason),
        Some(Err(err)) => println!("Bind failed: {}", err),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlink_protocol::{ModelSettings, ModuleType, ProtocolId};

    fn args(list: &[&str]) -> Result<Args> {
        Args::parse(list.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn test_args() {
        let parsed = args(&["model.json", "--write-defaults"]).unwrap();
        assert_eq!(parsed.settings, Some(PathBuf::from("model.json")));
        assert!(parsed.write_defaults);

        assert!(args(&[]).unwrap().settings.is_none());
        assert!(args(&["--verbose"]).is_err());
        assert!(args(&["a.json", "b.json"]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_frames() {
        let settings = RunnerSettings {
            run_ms: 500,
            ..RunnerSettings::default()
        };

        let report = run(settings, std::future::pending()).await.unwrap();

        assert_eq!(report.exit, MixerExit::Shutdown);
        assert!(!report.status.paused);
        assert!(report.frames[ModuleSlot::Internal.index()] > 0);
        assert!(report.frames[ModuleSlot::External.index()] > 0);
        assert_eq!(
            report.status.slots[ModuleSlot::External.index()].protocol,
            ProtocolId::Multimodule
        );
        assert!(report.watchdog_kicks > 0);
        assert!(report.events > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_binds_dsm2() {
        let mut model = ModelSettings::default();
        model.module_mut(ModuleSlot::External).module_type = ModuleType::Dsm2;
        let settings = RunnerSettings {
            model,
            run_ms: 3_000,
            bind: Some(ModuleSlot::External),
            ..RunnerSettings::default()
        };

        let report = run(settings, std::future::pending()).await.unwrap();

        assert!(matches!(
            report.bind,
            Some(Ok(BindOutcome::Bound { ref receiver })) if receiver == "SimuRX1"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_stops_early() {
        let settings = RunnerSettings {
            run_ms: 60_000,
            ..RunnerSettings::default()
        };

        let report = run(settings, sleep(Duration::from_millis(100))).await.unwrap();

        assert_eq!(report.exit, MixerExit::Shutdown);
        assert!(report.status.diagnostics.cycles < 100);
    }
}
