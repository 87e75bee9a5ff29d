use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lottie_data::{decode_payload, LottieJson};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use sticker_core::worker::derive_timing;
use sticker_core::{
    Animation, AnimationParams, AnimationRequest, Canvas, Container, Coords, DefaultSourceLoader, Engine,
    EngineConfig, Mount, PlaceholderFactory, Rgb, SourceLoader, ViewId,
};
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Engine configuration (JSON). Missing fields keep their defaults.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print document and playback timing information
    Inspect {
        /// Sticker file (.json or .tgs)
        #[arg(value_name = "FILE")]
        file: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Play a sticker headlessly with placeholder frames
    Play(PlayArgs),
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Sticker file (.json or .tgs)
    #[arg(value_name = "FILE")]
    file: String,

    /// Number of views sharing the animation
    #[arg(long, default_value_t = 1)]
    views: usize,

    /// Place views side by side on one shared canvas
    #[arg(long)]
    shared: bool,

    /// Logical sticker size in pixels
    #[arg(long, default_value_t = 128)]
    size: u32,

    /// Stop after this many seconds
    #[arg(long, default_value_t = 3.0)]
    seconds: f64,

    /// Host redraw rate
    #[arg(long, default_value_t = 60)]
    fps: u32,

    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    #[arg(long)]
    no_loop: bool,

    #[arg(long)]
    low_priority: bool,

    /// Play native frames FROM..=TO, e.g. `10:40`
    #[arg(long, value_parser = parse_segment, conflicts_with = "marker")]
    segment: Option<(u32, u32)>,

    /// Play the segment of a named marker
    #[arg(long)]
    marker: Option<String>,

    /// Tint as `r,g,b`
    #[arg(long, value_parser = parse_color)]
    color: Option<Rgb>,

    /// Write the first view's last frame to a PNG file
    #[arg(long, value_name = "PNG")]
    snapshot: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogFormat {
    Pretty,
    Json,
}

fn parse_segment(s: &str) -> Result<(u32, u32), String> {
    let (from, to) = s
        .split_once(':')
        .ok_or_else(|| format!("expected FROM:TO, got '{}'", s))?;
    let from = from.trim().parse().map_err(|e| format!("bad FROM: {}", e))?;
    let to = to.trim().parse().map_err(|e| format!("bad TO: {}", e))?;
    Ok((from, to))
}

fn parse_color(s: &str) -> Result<Rgb, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(format!("expected r,g,b, got '{}'", s));
    };
    let channel = |v: &str| v.parse::<u8>().map_err(|e| format!("bad channel '{}': {}", v, e));
    Ok(Rgb(channel(*r)?, channel(*g)?, channel(*b)?))
}

fn init_logging(level: LogLevel, format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(level).into())
        .from_env_lossy();

    let subscriber_builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => subscriber_builder.json().init(),
        LogFormat::Pretty => subscriber_builder.pretty().init(),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.log_format);

    let result = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        Command::Inspect { file, json } => inspect(&config, &file, json),
        Command::Play(args) => play(config, args),
    });
    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let config = EngineConfig::from_json_file(path)?;
            info!("Config: {:?}", path);
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

#[derive(Serialize)]
struct Timing {
    target_fps: u32,
    reduce_factor: u32,
    ms_per_frame: f64,
    frames_count: usize,
}

#[derive(Serialize)]
struct Report<'a> {
    file: &'a str,
    gzip: bool,
    version: Option<&'a str>,
    name: Option<&'a str>,
    width: u32,
    height: u32,
    frame_rate: f32,
    total_frames: u32,
    duration_secs: f32,
    layers: usize,
    assets: usize,
    markers: Vec<&'a str>,
    normal: Timing,
    low_priority: Timing,
}

fn timing(config: &EngineConfig, document: &LottieJson, is_low_priority: bool) -> Result<Timing> {
    let target_fps = config.target_fps(is_low_priority);
    let timing = derive_timing(document, target_fps)?;
    Ok(Timing {
        target_fps,
        reduce_factor: timing.reduce_factor,
        ms_per_frame: timing.ms_per_frame,
        frames_count: timing.frames_count,
    })
}

fn inspect(config: &EngineConfig, file: &str, json: bool) -> Result<()> {
    let bytes = DefaultSourceLoader.load_bytes(file)?;
    let document = decode_payload(&bytes).with_context(|| format!("failed to decode {}", file))?;
    let report = Report {
        file,
        gzip: lottie_data::payload::is_gzip(&bytes),
        version: document.v.as_deref(),
        name: document.nm.as_deref(),
        width: document.w,
        height: document.h,
        frame_rate: document.frame_rate(),
        total_frames: document.total_frames(),
        duration_secs: document.duration_secs(),
        layers: document.layers.len(),
        assets: document.assets.len(),
        markers: document.markers.iter().map(|m| m.cm.as_str()).collect(),
        normal: timing(config, &document, false)?,
        low_priority: timing(config, &document, true)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("{}", report.file);
    println!("  payload      {}", if report.gzip { "gzip (.tgs)" } else { "json" });
    if let Some(name) = report.name {
        println!("  name         {}", name);
    }
    if let Some(version) = report.version {
        println!("  version      {}", version);
    }
    println!("  size         {}x{}", report.width, report.height);
    println!(
        "  frames       {} @ {} fps ({:.2}s)",
        report.total_frames, report.frame_rate, report.duration_secs
    );
    println!("  layers       {} ({} assets)", report.layers, report.assets);
    if !report.markers.is_empty() {
        println!("  markers      {}", report.markers.join(", "));
    }
    for (label, t) in [("normal", &report.normal), ("low-priority", &report.low_priority)] {
        println!(
            "  {:<12} {} frames, every {} native, {:.2} ms/frame (target {} fps)",
            label, t.frames_count, t.reduce_factor, t.ms_per_frame, t.target_fps
        );
    }
    Ok(())
}

fn play(config: EngineConfig, args: PlayArgs) -> Result<()> {
    if args.views == 0 {
        return Err(anyhow!("--views must be at least 1"));
    }
    if args.fps == 0 {
        return Err(anyhow!("--fps must be at least 1"));
    }
    let segment = match &args.marker {
        Some(name) => {
            let bytes = DefaultSourceLoader.load_bytes(&args.file)?;
            let document = decode_payload(&bytes)?;
            Some(
                document
                    .marker_segment(name)
                    .ok_or_else(|| anyhow!("no marker named '{}'", name))?,
            )
        }
        None => args.segment,
    };

    let engine = Engine::new(config, Arc::new(DefaultSourceLoader), Arc::new(PlaceholderFactory))?;
    info!(workers = engine.pool.len(), "Engine ready");

    let mut params = AnimationParams::sized(args.size);
    params.is_low_priority = args.low_priority;
    params.no_loop = args.no_loop;

    let (animation, views, _mounts) = mount_views(&engine, &args, params)?;
    animation.set_speed(args.speed);
    match segment {
        Some(segment) => animation.play_segment(segment, true, None)?,
        None => animation.play(false, None)?,
    }

    let frame_interval = Duration::from_secs_f64(1.0 / args.fps as f64);
    let deadline = Instant::now() + Duration::from_secs_f64(args.seconds.max(0.0));
    let mut redraws = 0u64;
    let mut envelopes = 0usize;
    let mut last_frame = None;
    let mut frames_shown = 0usize;
    while Instant::now() < deadline {
        let started = Instant::now();
        let stats = engine.run_frame(started)?;
        redraws += 1;
        envelopes += stats.envelopes;

        let snapshot = animation.snapshot();
        if snapshot.prev_frame_index != last_frame {
            last_frame = snapshot.prev_frame_index;
            frames_shown += 1;
        }
        if snapshot.is_ended || (segment.is_some() && !animation.is_playing() && last_frame.is_some()) {
            break;
        }
        if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    let snapshot = animation.snapshot();
    info!(
        redraws,
        envelopes,
        frames_shown,
        last_frame = ?snapshot.prev_frame_index,
        frames_count = ?snapshot.frames_count,
        reduce_factor = snapshot.reduce_factor,
        cached = snapshot.cached_frames,
        ended = snapshot.is_ended,
        "Playback finished"
    );
    if snapshot.frames_count.is_none() {
        warn!("The worker never reported timing; check the file path and format");
    }

    if let Some(path) = &args.snapshot {
        let canvas = animation
            .canvas(views[0])
            .ok_or_else(|| anyhow!("first view vanished"))?;
        save_png(&canvas, path)?;
        info!("Snapshot: {:?}", path);
    }

    engine.shutdown();
    Ok(())
}

/// Attaches `args.views` views, all under render id `cli`.
fn mount_views(
    engine: &Engine,
    args: &PlayArgs,
    params: AnimationParams,
) -> Result<(Animation, Vec<ViewId>, Vec<Mount>)> {
    let shared = if args.shared {
        Some(Canvas::shared(args.size * args.views as u32, args.size)?)
    } else {
        None
    };
    let mut animation: Option<Animation> = None;
    let mut views = Vec::with_capacity(args.views);
    let mut mounts = Vec::new();
    for i in 0..args.views {
        let container = match &shared {
            Some(canvas) => Container::SharedCanvas(canvas.clone()),
            None => {
                let mount = Mount::attached();
                mounts.push(mount.clone());
                Container::Mount(mount)
            }
        };
        let x = i as f32 / args.views as f32;
        let mut request = AnimationRequest::new(args.file.clone(), container, "cli")
            .with_params(params.clone().at(Coords::new(x, 0.0)));
        if let Some(color) = args.color {
            request = request.with_color(color);
        }
        views.push(request.view_id());
        animation = Some(engine.init(request)?);
    }
    let animation = animation.ok_or_else(|| anyhow!("no views requested"))?;
    Ok((animation, views, mounts))
}

fn save_png(canvas: &Canvas, path: &PathBuf) -> Result<()> {
    canvas
        .with_pixmap(|pixmap| pixmap.save_png(path))
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_parse() {
        assert_eq!(parse_segment("10:40"), Ok((10, 40)));
        assert_eq!(parse_segment(" 7 : 3 "), Ok((7, 3)));
        assert!(parse_segment("10").is_err());
        assert!(parse_segment("a:b").is_err());
    }

    #[test]
    fn colors_parse() {
        assert_eq!(parse_color("255, 0,16"), Ok(Rgb(255, 0, 16)));
        assert!(parse_color("1,2").is_err());
        assert!(parse_color("1,2,300").is_err());
    }

    #[test]
    fn cli_accepts_play_flags() {
        let cli = Cli::try_parse_from([
            "sticker", "play", "duck.tgs", "--views", "3", "--shared", "--segment", "0:30", "--no-loop",
        ])
        .unwrap();
        match cli.command {
            Command::Play(args) => {
                assert_eq!(args.views, 3);
                assert!(args.shared);
                assert_eq!(args.segment, Some((0, 30)));
                assert!(args.no_loop);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
