//! walk — drive the wayfinder guidance engine from the terminal.
//!
//! | Command  | What it does                                                      |
//! |----------|-------------------------------------------------------------------|
//! | `replay` | local guidance over a recorded walk on a simulated clock          |
//! | `serve`  | guidance server: tracks progress for connecting clients           |
//! | `follow` | remote guidance: streams a recorded walk to a `serve` instance    |
//!
//! ```text
//! walk replay --route data/route.json --walk data/walk.csv --jitter 3
//! walk serve  --route data/route.json --session demo
//! walk follow --route data/route.json --walk data/walk.csv --session demo
//! ```
//!
//! Logging goes through `RUST_LOG` (default `walk=info,wf_session=info`).

mod console;
mod serve;

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wf_channel::TcpTransport;
use wf_core::{GuidanceConfig, Millis, PositionFix, RoutePlan, SessionId};
use wf_guidance::SessionState;
use wf_position::{JitterSource, PositionSource, ReplaySource, load_fixes_csv};
use wf_session::{RouteSession, RouteSessionBuilder};

use console::{ConsoleObserver, ConsoleSpeech};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Time allowed past the last recorded fix before giving up on arrival.
const OVERRUN_MS: u64 = 30_000;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "walk", version, about = "Turn-by-turn guidance over a recorded walk")]
struct Cli {
    /// Guidance configuration (TOML).  Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct WalkArgs {
    /// Route-provider JSON.
    #[arg(long)]
    route: PathBuf,

    /// Recorded fixes: `latitude,longitude,accuracy_m,timestamp_ms`.
    #[arg(long)]
    walk: PathBuf,

    /// Standard deviation of simulated GPS noise, metres.
    #[arg(long, default_value_t = 0.0)]
    jitter: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Tick period, milliseconds.
    #[arg(long, default_value_t = 250)]
    step_ms: u64,

    /// Print every fix.
    #[arg(long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate proximity locally.
    Replay {
        #[command(flatten)]
        walk: WalkArgs,

        /// Pace ticks against the wall clock instead of running flat out.
        #[arg(long)]
        realtime: bool,
    },
    /// Serve guidance for one registered route.
    Serve {
        #[arg(long)]
        route: PathBuf,

        #[arg(long, default_value = "demo")]
        session: String,

        /// Guidance socket; defaults to `channel.address` from the config.
        #[arg(long)]
        bind: Option<String>,

        /// Location relay socket; defaults to `channel.relay_address`.
        #[arg(long)]
        relay_bind: Option<String>,
    },
    /// Follow server-side guidance while replaying the walk in real time.
    Follow {
        #[command(flatten)]
        walk: WalkArgs,

        #[arg(long, default_value = "demo")]
        session: String,

        /// Guidance server; defaults to `channel.address` from the config.
        #[arg(long)]
        address: Option<String>,
    },
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("walk=info,wf_session=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => GuidanceConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GuidanceConfig::default(),
    };

    match cli.command {
        Command::Replay { walk, realtime } => replay(&config, &walk, realtime),
        Command::Serve { route, session, bind, relay_bind } => {
            let plan = load_route(&route)?;
            let bind = bind.unwrap_or_else(|| config.channel.address.clone());
            let relay_bind = relay_bind.or_else(|| config.channel.relay_address.clone());
            serve::run(&config, plan, SessionId::new(session), &bind, relay_bind.as_deref())
        }
        Command::Follow { walk, session, address } => follow(&config, &walk, session, address),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn replay(config: &GuidanceConfig, args: &WalkArgs, realtime: bool) -> Result<()> {
    let plan = load_route(&args.route)?;
    let (source, deadline) = load_walk(config, args)?;

    println!("=== walk — local guidance ===");
    println!(
        "Route: {} steps to {} ({})  |  jitter σ {:.1} m",
        plan.len(),
        plan.destination,
        plan.total_distance,
        args.jitter
    );
    println!();

    let mut session = RouteSessionBuilder::new(config.clone(), source)
        .speech(ConsoleSpeech::default())
        .build()?;
    let mut obs = ConsoleObserver::new(args.verbose);

    let t0 = Instant::now();
    let end = drive(&mut session, &mut obs, plan, deadline, args.step_ms, realtime)?;
    summarize(&session, &obs, end, t0);
    Ok(())
}

fn follow(
    config:  &GuidanceConfig,
    args:    &WalkArgs,
    session: String,
    address: Option<String>,
) -> Result<()> {
    let plan = load_route(&args.route)?;
    let (source, deadline) = load_walk(config, args)?;
    let address = address.unwrap_or_else(|| config.channel.address.clone());
    let timeout = Duration::from_millis(config.channel.connect_timeout_ms);

    println!("=== walk — remote guidance via {address} ===");
    println!();

    let mut builder = RouteSessionBuilder::new(config.clone(), source)
        .speech(ConsoleSpeech::default())
        .session_id(SessionId::new(session))
        .channel(Box::new(TcpTransport::new(address, timeout)));
    if let Some(relay) = &config.channel.relay_address {
        builder = builder.relay(Box::new(TcpTransport::new(relay.clone(), timeout)));
    }
    let mut session = builder.build()?;
    let mut obs = ConsoleObserver::new(args.verbose);

    if config.channel.relay_address.is_some() {
        session.start_tracking(Millis::ZERO, &mut obs);
    }
    let t0 = Instant::now();
    let end = drive(&mut session, &mut obs, plan, deadline, args.step_ms, true)?;
    session.stop_tracking();
    summarize(&session, &obs, end, t0);
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_route(path: &Path) -> Result<RoutePlan> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let plan = RoutePlan::from_provider_json(&json)?;
    if plan.is_empty() {
        bail!("{} has no steps", path.display());
    }
    info!(steps = plan.len(), destination = %plan.destination, "route loaded");
    Ok(plan)
}

/// The recorded walk as a (possibly noisy) source, plus the tick deadline.
fn load_walk(config: &GuidanceConfig, args: &WalkArgs) -> Result<(JitterSource<ReplaySource>, Millis)> {
    let fixes = load_fixes_csv(&args.walk)?;
    let span = match (fixes.first(), fixes.last()) {
        (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
        _ => bail!("{} has no fixes", args.walk.display()),
    };
    info!(fixes = fixes.len(), span_ms = span, "walk loaded");

    let deadline = Millis(span + config.arrival_grace_ms + OVERRUN_MS);
    let replay = ReplaySource::new(fixes, config.acquisition_timeout_ms);
    Ok((JitterSource::new(replay, args.jitter, args.seed), deadline))
}

/// Start `plan` at t=0 and tick until the session winds down or `deadline`.
fn drive<S: PositionSource>(
    session:  &mut RouteSession<S, ConsoleSpeech>,
    obs:      &mut ConsoleObserver,
    plan:     RoutePlan,
    deadline: Millis,
    step_ms:  u64,
    realtime: bool,
) -> Result<Millis> {
    let origin = Instant::now();
    let mut now = Millis::ZERO;
    session.start_navigation(plan, now, obs)?;

    while session.state() != SessionState::Idle && now <= deadline {
        if realtime {
            let target = origin + Duration::from_millis(now.0);
            if let Some(wait) = target.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
        }
        session.tick(now, obs);
        now = now.offset(step_ms.max(1));
    }

    if session.state() != SessionState::Idle {
        warn!(%now, "walk ended before arrival");
        session.stop(obs);
    }
    Ok(now)
}

fn summarize<S: PositionSource>(
    session: &RouteSession<S, ConsoleSpeech>,
    obs:     &ConsoleObserver,
    end:     Millis,
    t0:      Instant,
) {
    let spoken = session.voice().engine().map_or(0, ConsoleSpeech::spoken);
    let last: Option<&PositionFix> = session.latest_fix();

    println!();
    println!("Finished at {end} ({:.3} s wall clock)", t0.elapsed().as_secs_f64());
    println!("  arrived          : {}", if obs.arrived { "yes" } else { "no" });
    println!("  fixes            : {}", obs.fixes);
    println!("  announcements    : {spoken}");
    println!("  position errors  : {}", obs.position_errors);
    println!("  discarded updates: {}", obs.discarded);
    if let Some(fix) = last {
        println!("  last fix         : {}", fix.coordinate);
    }
}
