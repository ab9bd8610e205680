use std::{io::Write, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    select,
};
use tracing::{level_filters::LevelFilter, warn};

use crate::{
    probe::{ActivityProbe, SystemProbe},
    storage::{EntryStore, JsonEntryStore},
    tracker::{
        config::{ConfigPatch, TrackerConfig},
        entry::TimeEntry,
        error::TrackerError,
        StatusSnapshot, Tracker,
    },
    utils::{
        clock::DefaultClock,
        dir::create_application_default_path,
        logging::enable_logging,
    },
};

#[derive(Parser, Debug)]
#[command(name = "Onetrack", version, long_about = None)]
#[command(about = "Time tracker with idle time detection", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Track time for a task until interrupted with Ctrl-C")]
    Track {
        #[arg(help = "Project the time is booked on")]
        project: String,
        #[arg(help = "Task within the project")]
        task: String,
    },
    #[command(about = "List recorded time entries")]
    Entries {},
    #[command(about = "Show the configuration, or change the given fields")]
    Config {
        #[arg(long, help = "Minutes without input before the user counts as idle (1-60)")]
        idle_threshold_minutes: Option<u32>,
        #[arg(long, help = "Turn idle detection on or off")]
        idle_detection: Option<bool>,
        #[arg(long, help = "Count keyboard input as activity")]
        track_keyboard: Option<bool>,
        #[arg(long, help = "Count mouse input as activity")]
        track_mouse: Option<bool>,
        #[arg(long, help = "Require a reason when keeping idle time")]
        require_idle_reason: Option<bool>,
    },
    #[command(about = "Sample the activity probe once. Used for debugging input backends")]
    Probe {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = match args.dir {
        Some(dir) => dir,
        None => create_application_default_path()?,
    };

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(&dir, logging_level, args.log)?;

    match args.commands {
        Commands::Track { project, task } => run_tracking_session(dir, &project, &task).await,
        Commands::Entries {} => print_entries(dir).await,
        Commands::Config {
            idle_threshold_minutes,
            idle_detection,
            track_keyboard,
            track_mouse,
            require_idle_reason,
        } => {
            process_config_command(
                dir,
                ConfigPatch {
                    idle_threshold_minutes,
                    idle_detection_enabled: idle_detection,
                    track_keyboard,
                    track_mouse,
                    require_idle_reason,
                },
            )
            .await
        }
        Commands::Probe {} => sample_probe(),
    }
}

/// Foreground tracking session: opens an entry, renders the live status and takes idle
/// decisions from stdin until Ctrl-C. The entry is closed on the way out.
async fn run_tracking_session(dir: PathBuf, project: &str, task: &str) -> Result<()> {
    let store: Arc<dyn EntryStore> = Arc::new(JsonEntryStore::new(dir)?);
    let probe = Box::new(SystemProbe::new()?);
    let tracker = Tracker::open(store, probe, Arc::new(DefaultClock)).await?;

    match tracker.current_entry() {
        None => {
            tracker.start(project, task).await?;
        }
        Some(entry) => {
            println!(
                "Resuming entry for {}/{} left open by a previous run",
                entry.project_id, entry.task_id
            );
        }
    }

    let mut updates = tracker.subscribe();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut prompted = false;

    loop {
        select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                render_snapshot(&snapshot, &mut prompted);
            }
            line = input.next_line() => {
                match line? {
                    Some(line) => {
                        if let Err(e) = handle_command(&tracker, line.trim()).await {
                            println!("{e}");
                        }
                    }
                    None => break,
                }
            }
        }
    }

    println!();
    let closed = close_session(&tracker, &mut input).await?;
    println!(
        "Recorded {} on {}/{}",
        format_duration(closed.duration_secs.unwrap_or(0)),
        closed.project_id,
        closed.task_id
    );
    Ok(())
}

/// Stops the session, prompting for an idle decision as long as one is pending. A closed stdin
/// discards the interval so shutdown can still finish cleanly.
async fn close_session(tracker: &Tracker, input: &mut Lines<BufReader<Stdin>>) -> Result<TimeEntry> {
    loop {
        match tracker.stop().await {
            Ok(entry) => return Ok(entry),
            Err(TrackerError::PendingIdleDecision) => {
                println!("An idle time decision is still pending. Type 'keep <reason>' or 'drop':");
                match input.next_line().await? {
                    Some(line) => {
                        if let Err(e) = handle_command(tracker, line.trim()).await {
                            println!("{e}");
                        }
                    }
                    None => {
                        warn!("stdin closed with a pending idle decision, discarding interval");
                        tracker.resolve_idle(false, None)?;
                    }
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// In-session commands read from stdin.
async fn handle_command(tracker: &Tracker, line: &str) -> Result<()> {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    match command {
        "" => {}
        "keep" => {
            let reason = (!rest.is_empty()).then(|| rest.to_owned());
            tracker.resolve_idle(true, reason)?;
            println!("Idle time kept");
        }
        "drop" => {
            tracker.resolve_idle(false, None)?;
            println!("Idle time discarded");
        }
        "idle" => {
            let enabled = match rest {
                "on" => true,
                "off" => false,
                _ => {
                    println!("Usage: idle on|off");
                    return Ok(());
                }
            };
            tracker
                .configure(ConfigPatch {
                    idle_detection_enabled: Some(enabled),
                    ..ConfigPatch::default()
                })
                .await?;
            println!("Idle detection {}", if enabled { "on" } else { "off" });
        }
        "threshold" => {
            let minutes: u32 = match rest.parse() {
                Ok(minutes) => minutes,
                Err(_) => {
                    println!("Usage: threshold <minutes>");
                    return Ok(());
                }
            };
            tracker
                .configure(ConfigPatch {
                    idle_threshold_minutes: Some(minutes),
                    ..ConfigPatch::default()
                })
                .await?;
            println!("Idle threshold set to {minutes} min");
        }
        _ => {
            println!("Commands: keep <reason> | drop | idle on|off | threshold <minutes>");
        }
    }
    Ok(())
}

fn render_snapshot(snapshot: &StatusSnapshot, prompted: &mut bool) {
    match &snapshot.pending_decision {
        Some(pending) if !*prompted => {
            *prompted = true;
            let span = (pending.end - pending.start).num_seconds();
            println!();
            println!(
                "You were idle for {} (since {}).",
                format_duration(span),
                pending.start.format("%H:%M:%S")
            );
            if pending.requires_reason {
                println!("Type 'keep <reason>' to count it toward the entry, or 'drop' to discard it.");
            } else {
                println!("Type 'keep [reason]' to count it toward the entry, or 'drop' to discard it.");
            }
        }
        Some(_) => {}
        None => {
            *prompted = false;
            print!("\rTracking {} ", format_duration(snapshot.elapsed_seconds));
            let _ = std::io::stdout().flush();
        }
    }
}

async fn print_entries(dir: PathBuf) -> Result<()> {
    let store = JsonEntryStore::new(dir)?;
    let entries = store.list_entries().await?;
    if entries.is_empty() {
        println!("No entries recorded yet");
        return Ok(());
    }
    for entry in entries {
        let kept_idle: usize = entry
            .idle_intervals
            .iter()
            .filter(|interval| !interval.discarded)
            .count();
        print!(
            "{}  {}  {}/{}",
            entry.start_time.format("%Y-%m-%d %H:%M"),
            format_duration(entry.duration_secs.unwrap_or(0)),
            entry.project_id,
            entry.task_id,
        );
        if kept_idle > 0 {
            print!("  ({kept_idle} idle interval(s) kept)");
        }
        println!();
    }
    Ok(())
}

async fn process_config_command(dir: PathBuf, patch: ConfigPatch) -> Result<()> {
    let store = JsonEntryStore::new(dir)?;
    let current = store.load_config().await?.unwrap_or_default();
    if patch_is_empty(&patch) {
        print_config(&current);
        return Ok(());
    }
    let next = current.merged(&patch)?;
    store.save_config(&next).await?;
    print_config(&next);
    Ok(())
}

fn patch_is_empty(patch: &ConfigPatch) -> bool {
    patch.idle_threshold_minutes.is_none()
        && patch.idle_detection_enabled.is_none()
        && patch.track_keyboard.is_none()
        && patch.track_mouse.is_none()
        && patch.require_idle_reason.is_none()
}

fn print_config(config: &TrackerConfig) {
    println!("idle_detection_enabled: {}", config.idle_detection_enabled);
    println!("idle_threshold_minutes: {}", config.idle_threshold_minutes);
    println!("track_keyboard:         {}", config.track_keyboard);
    println!("track_mouse:            {}", config.track_mouse);
    println!("require_idle_reason:    {}", config.require_idle_reason);
}

fn sample_probe() -> Result<()> {
    let mut probe = SystemProbe::new()?;
    let status = probe.sample()?;
    let idle = probe.is_idle(std::time::Duration::from_secs(60))?;
    println!("keyboard_active: {}", status.keyboard_active);
    println!("mouse_active:    {}", status.mouse_active);
    println!("idle for 1 min:  {idle}");
    Ok(())
}

fn format_duration(total_secs: i64) -> String {
    let secs = total_secs.max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
