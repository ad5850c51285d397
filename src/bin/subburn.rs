use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "subburn", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Burn captions into an MP4 (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Print the track layout of an MP4 as JSON.
    Probe(ProbeArgs),
    /// List the built-in effect presets.
    Presets,
    /// Check a caption file for readability problems.
    Check(CheckArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FitChoice {
    Contain,
    Cover,
}

impl From<FitChoice> for subburn::FitMode {
    fn from(f: FitChoice) -> Self {
        match f {
            FitChoice::Contain => subburn::FitMode::Contain,
            FitChoice::Cover => subburn::FitMode::Cover,
        }
    }
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Source MP4.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Captions: `.srt`, a JSON cue array or a caption document.
    #[arg(long)]
    cues: PathBuf,

    /// Style JSON; defaults apply when omitted.
    #[arg(long)]
    style: Option<PathBuf>,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Effect preset id or legacy effect name, overriding the style.
    #[arg(long)]
    effect: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long, default_value_t = 30.0)]
    framerate: f64,

    /// Bits per second.
    #[arg(long, default_value_t = 5_000_000)]
    bitrate: u64,

    #[arg(long, default_value_t = 60)]
    keyframe_interval: u32,

    /// auto, source, h264-baseline, h264-main, h264-high or hevc.
    #[arg(long, default_value = "auto")]
    codec: subburn::CodecPreference,

    #[arg(long, value_enum, default_value_t = FitChoice::Contain)]
    fit: FitChoice,

    /// Extra directory of `.ttf`/`.otf` fonts.
    #[arg(long)]
    font_dir: Option<PathBuf>,

    /// Write JPEG previews into this directory.
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// Fail instead of warning when the source ends early.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Source MP4.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Captions: `.srt`, a JSON cue array or a caption document.
    #[arg(long)]
    cues: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Probe(args) => cmd_probe(args),
        Command::Presets => cmd_presets(),
        Command::Check(args) => cmd_check(args),
    }
}

/// Cues plus the style embedded in a caption document, if any.
fn load_cues(
    path: &Path,
) -> anyhow::Result<(Vec<subburn::SubtitleCue>, Option<subburn::SubtitleStyle>)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read captions '{}'", path.display()))?;
    let is_srt = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("srt"));
    if is_srt {
        if let Some(msg) = subburn::validate_srt_content(&text) {
            anyhow::bail!("{}: {msg}", path.display());
        }
        return Ok((subburn::parse_srt(&text), None));
    }
    if text.trim_start().starts_with('[') {
        let cues = serde_json::from_str(&text)
            .with_context(|| format!("parse cue array '{}'", path.display()))?;
        return Ok((cues, None));
    }
    let doc: subburn::CaptionData = serde_json::from_str(&text)
        .with_context(|| format!("parse caption document '{}'", path.display()))?;
    let mut style = doc.default_style;
    if style.video_fit.is_none() {
        style.video_fit = doc.video_fit;
    }
    Ok((doc.cues, Some(style)))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let (cues, doc_style) = load_cues(&args.cues)?;
    let mut style = match &args.style {
        Some(path) => {
            let f = std::fs::File::open(path)
                .with_context(|| format!("open style '{}'", path.display()))?;
            serde_json::from_reader(std::io::BufReader::new(f))
                .with_context(|| format!("parse style '{}'", path.display()))?
        }
        None => doc_style.unwrap_or_default(),
    };
    if let Some(effect) = args.effect {
        style.effect = effect;
    }

    let source = std::fs::read(&args.in_path)
        .with_context(|| format!("read source '{}'", args.in_path.display()))?;

    let mut options = subburn::RenderOptions {
        width: args.width,
        height: args.height,
        framerate: args.framerate,
        bitrate: args.bitrate,
        keyframe_interval: args.keyframe_interval,
        codec_preference: args.codec,
        fit: args.fit.into(),
        ..subburn::RenderOptions::default()
    };
    if args.strict {
        options.truncation = subburn::TruncationPolicy::Error;
    }
    if args.preview_dir.is_none() {
        options.preview.every_frames = 0;
    }

    let mut fonts = subburn::FontBook::system();
    if let Some(dir) = &args.font_dir {
        fonts.load_font_dir(dir);
    }

    let backend = subburn::FfmpegBackend::new();
    let mut last_pct = -1i64;
    let mut renderer = subburn::Renderer::new(&backend, source, cues, style, options)
        .with_fonts(fonts)
        .on_status(|s| eprintln!("{s}"))
        .on_progress(move |p| {
            let pct = (p * 100.0).floor() as i64;
            if pct / 5 != last_pct / 5 {
                last_pct = pct;
                eprintln!("{pct:>3}%");
            }
        });

    if let Some(dir) = args.preview_dir.clone() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create preview dir '{}'", dir.display()))?;
        renderer = renderer.on_frame(move |frame| {
            let path = dir.join(format!("preview_{:010.3}.jpg", frame.time));
            if let Err(e) = std::fs::write(&path, &frame.jpeg) {
                tracing::warn!(path = %path.display(), error = %e, "failed to write preview");
            }
        });
    }

    let video = renderer.start()?;
    video.download(&args.out)?;
    eprintln!(
        "wrote {} ({} frames, {} audio samples, {})",
        args.out.display(),
        video.frames_encoded,
        video.audio_samples,
        video.encoder.codec
    );
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.in_path)
        .with_context(|| format!("read source '{}'", args.in_path.display()))?;
    let backend = subburn::FfmpegBackend::new();
    let info = subburn::probe_container(&backend, Arc::from(bytes))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn cmd_presets() -> anyhow::Result<()> {
    let registry = subburn::PresetRegistry::builtin()?;
    for p in registry.iter() {
        let scope = match p.scope {
            subburn::Scope::Line => "line",
            subburn::Scope::Word => "word",
        };
        let kinds: Vec<&str> = [&p.entry, &p.active, &p.exit]
            .into_iter()
            .flatten()
            .map(|k| k.kind_name())
            .collect();
        println!("{:<28} {:<5} {}", p.id, scope, kinds.join(","));
    }
    Ok(())
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let (cues, _) = load_cues(&args.cues)?;
    let problems = subburn::validate_all_cues(&cues);
    for p in &problems {
        println!("cue {:>4}: {}", p.cue_id, p.message);
    }
    let summary = subburn::problem_summary(&problems);
    eprintln!("{} cues, {} problems {:?}", cues.len(), problems.len(), summary);
    Ok(())
}
