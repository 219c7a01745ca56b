use clap::{Parser, Subcommand};
use resonant::config::Config;
use resonant::metadata::{synthesize_to, MetadataStore, DEFAULT_AUTO_METADATA};
use resonant::raw_codec::RawCodec;
use resonant::recovery::{self, ReconstructError};
use resonant::slicer::Slicer;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resonant", about = "Wave/pulse fragment extraction and raw field reconstruction")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log every fragment (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cut a raw field file into transformed wave/pulse fragments
    Extract {
        /// Path to the raw field file
        raw_file: PathBuf,
        /// Output directory for fragments and metadata.json
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Rebuild a raw field from fragments and metadata
    Reconstruct {
        #[arg(short = 'd', long)]
        fragments_dir: Option<PathBuf>,
        #[arg(short, long)]
        metadata: Option<PathBuf>,
        /// Metadata consulted when --metadata does not exist
        #[arg(long)]
        fallback: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Synthesize metadata from file names into the fallback path if none exists
        #[arg(long)]
        synthesize: bool,
    },
    /// Convert a JSON integer, byte array, hex string or text into a raw file
    Encode {
        #[arg(short, long)]
        input_json: Option<PathBuf>,
        #[arg(short, long)]
        output_raw: Option<PathBuf>,
    },
    /// Infer metadata from fragment file names
    Synthesize {
        #[arg(short = 'd', long)]
        fragments_dir: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List metadata records in store order
    List {
        #[arg(short, long)]
        metadata: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[ERROR] {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "resonant=debug" } else { "resonant=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { raw_file, output_dir } => {
            let mut opts = config.extract_options();
            if let Some(dir) = output_dir {
                opts.output_dir = dir;
            }
            let slicer = Slicer::new(config.layout, opts)?;
            let report = slicer.extract_file(&raw_file)?;
            println!("[+] {}", report.summary());
        }

        // ── Reconstruct ──────────────────────────────────────────────────────
        Commands::Reconstruct { fragments_dir, metadata, fallback, output, synthesize } => {
            let mut opts = config.reconstruct_options();
            if let Some(d) = fragments_dir { opts.fragments_dir = d; }
            if let Some(m) = metadata      { opts.metadata = m; }
            if let Some(f) = fallback      { opts.fallback_metadata = Some(f); }
            if let Some(o) = output        { opts.output = o; }

            if synthesize {
                if let Err(ReconstructError::MissingMetadata { .. }) = opts.resolve_metadata() {
                    let target = opts
                        .fallback_metadata
                        .clone()
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_AUTO_METADATA));
                    synthesize_to(&opts.fragments_dir, &target)?;
                    opts.fallback_metadata = Some(target);
                }
            }

            let report = recovery::reconstruct(&opts, config.layout.fragment_size)?;
            println!("[+] {}", report.summary());
        }

        // ── Encode ───────────────────────────────────────────────────────────
        Commands::Encode { input_json, output_raw } => {
            let input  = input_json.unwrap_or(config.encode.input);
            let output = output_raw.unwrap_or(config.encode.output);
            let n = RawCodec::new(config.encode.max_integer_digits).encode_file(&input, &output)?;
            println!("[+] Wrote raw file: {} ({} bytes)", output.display(), n);
        }

        // ── Synthesize ───────────────────────────────────────────────────────
        Commands::Synthesize { fragments_dir, output } => {
            let dir = fragments_dir.unwrap_or(config.reconstruct.fragments_dir);
            let out = output.unwrap_or_else(|| PathBuf::from(DEFAULT_AUTO_METADATA));
            let store = synthesize_to(&dir, &out)?;
            println!("[+] Synthesized {} record(s) → {}", store.len(), out.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { metadata } => {
            let path = metadata.unwrap_or(config.reconstruct.metadata);
            if !path.exists() {
                return Err(format!("metadata not found: {}", path.display()).into());
            }
            let store = MetadataStore::load(&path)?;
            println!("Metadata: {} ({} records)", path.display(), store.len());
            println!("{:<32} {:>5} {:>8} {:>6}  {:<14} {:>7}  Chain",
                     "Fragment", "Wave", "Offset", "Pulse", "Seed", "Score");
            for (name, r) in store.iter() {
                println!("{:<32} {:>5} {:>8} {:>6}  {:<14} {:>7}  {}",
                    name,
                    opt(r.wave),
                    opt(r.offset),
                    opt(r.pulse_index),
                    r.seed.as_deref().unwrap_or("—"),
                    r.detection_score.map(|s| format!("{s:.4}")).unwrap_or_else(|| "—".into()),
                    r.transform_chain.join(">"));
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| "—".into())
}
