mod demo;

use std::{path::PathBuf, sync::Arc, thread, time::Duration};

use anyhow::Context;
use chronoplay_core::SavestateStore;
use chronoplay_runtime::{
    FileSavestateStore, MemorySavestateStore, PlaybackConfig, PlaybackSettings,
    ReversiblePlayback, Settings,
};
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use demo::BouncingBall;

/// Plays a demo simulation forward, rewinds it, and round-trips a savestate.
#[derive(Parser, Debug)]
#[command(name = "chronoplay")]
#[command(about = "Reversible playback demo", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    /// Seconds of forward play before rewinding
    #[arg(long, default_value_t = 3.0)]
    play_secs: f64,

    /// Seconds spent rewinding (at the derated speed)
    #[arg(long, default_value_t = 2.0)]
    rewind_secs: f64,

    /// Forward speed multiplier
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Rewind window in seconds (floored at ten seconds)
    #[arg(long, default_value_t = 60)]
    rewind_window: u32,

    /// Disable rewind history entirely
    #[arg(long)]
    no_rewind: bool,

    /// Multiplier applied to negative speeds
    #[arg(long, default_value_t = chronoplay_runtime::REWIND_FACTOR)]
    rewind_factor: f64,

    /// Auto-save period in seconds
    #[arg(long)]
    autosave_secs: Option<f64>,

    /// Persist savestates under this directory instead of in memory
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Game path recorded in savestates
    #[arg(long, default_value = "demo/bouncing-ball.bin")]
    game: PathBuf,

    /// Run without a game path; savestates are refused
    #[arg(long)]
    standalone: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.save_dir.clone() {
        Some(dir) => run(&args, Arc::new(FileSavestateStore::new(dir))),
        None => run(&args, Arc::new(MemorySavestateStore::new())),
    }
}

fn run<S: SavestateStore + 'static>(args: &Args, store: Arc<S>) -> anyhow::Result<()> {
    let settings = Settings::new(PlaybackSettings {
        rewind_enabled: !args.no_rewind,
        max_rewind_time_sec: args.rewind_window,
    });
    let config = PlaybackConfig {
        rewind_factor: args.rewind_factor,
        initial_speed: args.speed,
        autosave_interval: args
            .autosave_secs
            .map(Duration::try_from_secs_f64)
            .transpose()
            .context("invalid --autosave-secs")?,
        ..PlaybackConfig::default()
    };

    let game = (!args.standalone).then(|| args.game.clone());
    let engine = BouncingBall::new(game);
    let mut playback = ReversiblePlayback::new(engine, store, settings, config);
    playback.initialize()?;

    sleep_secs(args.play_secs)?;
    playback.pause_async();
    report(&playback, "played");

    let saved = playback.try_create_savestate("demo checkpoint");
    match &saved {
        Ok(id) => info!(%id, "savestate created"),
        Err(e) => info!(error = %e, "savestate unavailable"),
    }

    playback.set_speed(-1.0);
    sleep_secs(args.rewind_secs)?;
    playback.pause_async();
    report(&playback, "rewound");

    playback.seek_time_ms(playback.time_ms() / 2);
    report(&playback, "seeked to half");

    if let Ok(id) = saved {
        playback.try_load_savestate(&id)?;
        report(&playback, "restored");
    }

    if let Some(sched) = playback.scheduler_stats() {
        info!(
            forward = sched.forward_steps,
            backward = sched.backward_steps,
            idle_wakeups = sched.idle_wakeups,
            "scheduler"
        );
    }
    playback.deinitialize();
    Ok(())
}

fn report<S: SavestateStore + 'static>(playback: &ReversiblePlayback<BouncingBall, S>, what: &str) {
    let stats = playback.stats();
    let frame = playback.with_engine(|e| e.frame());
    info!(
        engine_frame = frame,
        elapsed_frames = stats.elapsed_frames,
        time_ms = playback.time_ms(),
        total_ms = playback.total_time_ms(),
        cache_percent = stats.cache_percent(),
        capture_failures = stats.capture_failures,
        "{what}"
    );
}

fn sleep_secs(secs: f64) -> anyhow::Result<()> {
    let duration = Duration::try_from_secs_f64(secs).context("invalid duration")?;
    thread::sleep(duration);
    Ok(())
}
