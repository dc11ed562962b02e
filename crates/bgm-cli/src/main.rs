//! Headless Sequencer Simulator
//!
//! Usage:
//!   bgm-sim --track forest.json                      - Play 30s, print events
//!   bgm-sim --track forest.json --seed 7 --json      - Reproducible JSON lines
//!   bgm-sim --track forest.json --stop-at 12         - Fade out at 12s
//!   bgm-sim --track forest.json --pause-at 4 --resume-at 6
//!
//! The host frame loop is simulated with a fixed tick; the virtual output
//! device clock advances by the same amount before every player step.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bgm_core::Track;
use bgm_event::{PlayerEvent, PlayerEventKind};
use bgm_player::{PlayState, Player, PlayerConfig, VirtualOutput};
use clap::Parser;
use parking_lot::Mutex;

#[derive(Parser, Debug)]
#[command(name = "bgm-sim", about = "Simulate adaptive music playback and print the event timeline")]
struct Cli {
    /// Track JSON file
    #[arg(short, long)]
    track: PathBuf,

    /// Player config JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated length (seconds)
    #[arg(long, default_value_t = 30.0)]
    seconds: f64,

    /// Host tick length (milliseconds)
    #[arg(long, default_value_t = 16.0)]
    tick_ms: f64,

    /// Seed for trigger rolls (overrides the config)
    #[arg(long)]
    seed: Option<u64>,

    /// Call stop() at this time (seconds)
    #[arg(long)]
    stop_at: Option<f64>,

    /// Call pause() at this time (seconds)
    #[arg(long, requires = "resume_at")]
    pause_at: Option<f64>,

    /// Call play() again at this time (seconds)
    #[arg(long, requires = "pause_at")]
    resume_at: Option<f64>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

/// Control calls issued during a simulation
#[derive(Debug, Clone, Copy, Default)]
struct Schedule {
    stop_at: Option<f64>,
    pause_at: Option<f64>,
    resume_at: Option<f64>,
}

/// Summary printed after the run
#[derive(Debug)]
struct Summary {
    final_state: PlayState,
    sessions: u64,
    binds: usize,
    releases: usize,
    /// `TrackLoopStarted` events delivered
    loops: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if !(cli.tick_ms.is_finite() && cli.tick_ms > 0.0) {
        bail!("--tick-ms must be a positive number (got {})", cli.tick_ms);
    }
    if !(cli.seconds.is_finite() && cli.seconds >= 0.0) {
        bail!("--seconds must be a non-negative number (got {})", cli.seconds);
    }

    let track = load_track(&cli.track)?;
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PlayerConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }

    log::info!(
        "simulating '{}' for {:.1}s at {}ms ticks",
        track.name,
        cli.seconds,
        cli.tick_ms
    );

    let schedule = Schedule {
        stop_at: cli.stop_at,
        pause_at: cli.pause_at,
        resume_at: cli.resume_at,
    };

    let json = cli.json;
    let summary = simulate(track, config, cli.seconds, cli.tick_ms / 1000.0, schedule, |event| {
        print_event(event, json)
    })?;

    log::info!(
        "done: state={} sessions={} loops={} binds={} releases={}",
        summary.final_state.name(),
        summary.sessions,
        summary.loops,
        summary.binds,
        summary.releases
    );
    Ok(())
}

fn load_track(path: &Path) -> Result<Track> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read track file {}", path.display()))?;
    let track = Track::from_json(&json)
        .with_context(|| format!("Failed to parse track file {}", path.display()))?;

    let report = track.inspect();
    for issue in &report.issues {
        log::warn!("{}", issue);
    }
    Ok(track)
}

fn load_config(path: &Path) -> Result<PlayerConfig> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    PlayerConfig::load(&json).with_context(|| format!("Invalid config file {}", path.display()))
}

/// Run the player against a virtual device, handing every event to `sink`
fn simulate<F>(
    track: Track,
    config: PlayerConfig,
    seconds: f64,
    dt: f64,
    schedule: Schedule,
    mut sink: F,
) -> Result<Summary>
where
    F: FnMut(&PlayerEvent) -> Result<()>,
{
    let mut player = Player::new(track, VirtualOutput::new(), config);
    let queue = Arc::new(Mutex::new(Vec::new()));
    let collector = Arc::clone(&queue);
    player.subscribe(move |event| collector.lock().push(event.clone()));

    let mut loops = 0;
    let mut flush = || -> Result<()> {
        let events = std::mem::take(&mut *queue.lock());
        for event in &events {
            if event.kind == PlayerEventKind::TrackLoopStarted {
                loops += 1;
            }
            sink(event)?;
        }
        Ok(())
    };

    player.play();
    flush()?;

    let steps = (seconds / dt).ceil() as u64;
    let (mut stopped, mut paused, mut resumed) = (false, false, false);

    for step in 1..=steps {
        let t = step as f64 * dt;

        player.output_mut().advance(dt);
        player.advance(dt);

        if !paused && schedule.pause_at.is_some_and(|at| t >= at) {
            paused = true;
            player.pause();
        }
        if paused && !resumed && schedule.resume_at.is_some_and(|at| t >= at) {
            resumed = true;
            player.play();
        }
        if !stopped && schedule.stop_at.is_some_and(|at| t >= at) {
            stopped = true;
            player.stop();
        }

        flush()?;

        if player.state() == PlayState::Stopped && player.pending_events() == 0 {
            break;
        }
    }

    Ok(Summary {
        final_state: player.state(),
        sessions: player.sessions_started(),
        binds: player.output().bind_count(),
        releases: player.output().release_count(),
        loops,
    })
}

fn print_event(event: &PlayerEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        println!(
            "{:>9.3}  {:<17} ch={:<3} seq={:<3} loop={}",
            event.time,
            event.kind.name(),
            event.channel_index(),
            event.sequence_index(),
            event.loop_index
        );
    }
    Ok(())
}
