use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

use calque::{
    AttachmentKind, BackendKind, FsSurfaceProvider, GenerateRequest, PersistedSession,
    PhotoAttachment, SurfaceProvider as _, create_backend, generate, kind_for_path,
};

#[derive(Parser, Debug)]
#[command(name = "calque", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the inspection report for a session file.
    Report(ReportArgs),
    /// Parse a session file and check its invariants.
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
struct ReportArgs {
    /// Input session JSON.
    #[arg(long = "session")]
    session_path: PathBuf,

    /// Output document path.
    #[arg(long)]
    out: PathBuf,

    /// Base surface key (a .pdf template or a raster plan), resolved
    /// against --assets-root. Omit to compose a blank titled report.
    #[arg(long)]
    base: Option<String>,

    /// Directory base-surface keys and photo sources resolve against.
    /// Defaults to the session file's directory.
    #[arg(long)]
    assets_root: Option<PathBuf>,

    /// Trailing footer line (e.g. the generation date).
    #[arg(long)]
    footer: Option<String>,

    /// Backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Pdf)]
    backend: BackendChoice,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Input session JSON.
    #[arg(long = "session")]
    session_path: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Pdf,
    Recording,
}

/// On-disk session layout: the persisted parallel arrays, with photo
/// payloads referenced by relative source path instead of inlined.
#[derive(Debug, serde::Deserialize)]
struct SessionFile {
    #[serde(flatten)]
    session: PersistedSession,
    #[serde(default)]
    photo_sources: Vec<PhotoSourceEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct PhotoSourceEntry {
    /// Index into `points`.
    point: usize,
    source: String,
    #[serde(default)]
    description: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Report(args) => cmd_report(args),
        Command::Validate(args) => cmd_validate(args),
    }
}

fn read_session_file(path: &Path) -> anyhow::Result<SessionFile> {
    let f = File::open(path).with_context(|| format!("open session '{}'", path.display()))?;
    let r = BufReader::new(f);
    let file: SessionFile = serde_json::from_reader(r).with_context(|| "parse session JSON")?;
    Ok(file)
}

fn attach_photo_sources(
    file: SessionFile,
    assets_root: &Path,
) -> anyhow::Result<PersistedSession> {
    let mut session = file.session;
    for entry in file.photo_sources {
        let point = session.points.get_mut(entry.point).with_context(|| {
            format!("photo source references missing point {}", entry.point)
        })?;
        let path = assets_root.join(&entry.source);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("read photo '{}'", path.display()))?;
        let kind = kind_for_path(&entry.source);
        if kind == AttachmentKind::Unknown {
            tracing::warn!(source = %entry.source, "unrecognized photo type, it will be skipped at render time");
        }
        point
            .photos
            .push(PhotoAttachment::new(kind, entry.description, bytes));
    }
    Ok(session)
}

fn cmd_report(args: ReportArgs) -> anyhow::Result<()> {
    let assets_root = args
        .assets_root
        .clone()
        .or_else(|| args.session_path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let file = read_session_file(&args.session_path)?;
    let session = attach_photo_sources(file, &assets_root)?;
    let snapshot = session.into_snapshot()?;

    let base = match &args.base {
        Some(key) => Some(FsSurfaceProvider::new(&assets_root).load(key)?),
        None => None,
    };

    let request = GenerateRequest::Session {
        snapshot,
        footer: args.footer.clone(),
    };
    let kind = match args.backend {
        BackendChoice::Pdf => BackendKind::Pdf,
        BackendChoice::Recording => BackendKind::Recording,
    };
    let mut backend = create_backend(kind);
    let doc = generate(&request, base.as_ref(), backend.as_mut())?;

    for skip in &doc.skipped {
        eprintln!(
            "skipped attachment {} of point {:?}: {}",
            skip.photo_index + 1,
            skip.annotation_id,
            skip.reason
        );
    }

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &doc.bytes)
        .with_context(|| format!("write report '{}'", args.out.display()))?;

    eprintln!("wrote {} ({})", args.out.display(), doc.content_type);
    Ok(())
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let file = read_session_file(&args.session_path)?;
    let points = file.session.points.len();
    let zones = file
        .session
        .rectangles
        .iter()
        .filter(|z| z.is_some())
        .count();
    let snapshot = file.session.into_snapshot()?;

    eprintln!(
        "{}: {:?} session, {} annotations ({} with zones), surface {}x{}",
        args.session_path.display(),
        snapshot.mode,
        points,
        zones,
        snapshot.surface.width,
        snapshot.surface.height
    );
    Ok(())
}
