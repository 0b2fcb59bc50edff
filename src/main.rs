use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use blockface_align::apply::{FrameAction, ProgressCallback};
use blockface_align::config::{Interpolation, ResamplerBackend};
use blockface_align::logger::DualLogger;
use blockface_align::manifest::{default_manifest_path, RunManifest};
use blockface_align::{pipeline, resample, settings, AlignError};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InterpolationArg {
    Nearest,
    Bilinear,
}

impl From<InterpolationArg> for Interpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::Nearest => Interpolation::Nearest,
            InterpolationArg::Bilinear => Interpolation::Bilinear,
        }
    }
}

#[derive(Parser)]
#[command(name = "blockface-align")]
#[command(about = "Apply accumulated pairwise registrations to a blockface image stack")]
#[command(version)]
struct Cli {
    /// Directory holding the source frames.
    #[arg(long)]
    input: PathBuf,

    /// Directory for corrected grayscale frames (created if missing).
    #[arg(long)]
    output: PathBuf,

    /// Run manifest (JSON or YAML). Defaults to <input>/transforms.json.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Extra non-propagating frames, 1-based.
    #[arg(long, value_delimiter = ',')]
    non_propagating: Vec<usize>,

    /// Worker threads for the apply stage (0 = derive from cores and memory).
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, value_enum)]
    interpolation: Option<InterpolationArg>,

    /// Largest matrix deviation still treated as identity.
    #[arg(long)]
    identity_tolerance: Option<f64>,

    /// Directory for temporary resampled frames.
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// External resampling program; arguments follow via --resampler-arg.
    #[arg(long)]
    resampler_cmd: Option<String>,

    /// Argument template for --resampler-cmd ({input}, {output}, {matrix}).
    #[arg(long = "resampler-arg", allow_hyphen_values = true)]
    resampler_args: Vec<String>,

    /// Stop starting new frames after the first failure.
    #[arg(long)]
    fail_fast: bool,

    /// Also append log records to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the accumulated transforms and exit without writing frames.
    #[arg(long)]
    dry_run: bool,

    /// Persist the effective settings as the new defaults.
    #[arg(long)]
    save_settings: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    DualLogger::init(cli.log_file.as_deref())?;

    let mut config = settings::load_settings();
    if let Some(threads) = cli.threads {
        config.worker_threads = threads;
    }
    if let Some(interpolation) = cli.interpolation {
        config.interpolation = interpolation.into();
    }
    if let Some(tolerance) = cli.identity_tolerance {
        config.identity_tolerance = tolerance;
    }
    if let Some(dir) = &cli.temp_dir {
        config.temp_dir = Some(dir.clone());
    }
    if let Some(program) = &cli.resampler_cmd {
        config.resampler = ResamplerBackend::Command {
            program: program.clone(),
            args: cli.resampler_args.clone(),
        };
    }
    if cli.fail_fast {
        config.fail_fast = true;
    }
    if cli.save_settings {
        settings::save_settings(&config)?;
    }

    let manifest_path = cli
        .manifest
        .clone()
        .unwrap_or_else(|| default_manifest_path(&cli.input));
    let manifest = if manifest_path.exists() {
        RunManifest::load(&manifest_path)?
    } else if cli.manifest.is_some() {
        anyhow::bail!("manifest {} does not exist", manifest_path.display());
    } else {
        log::warn!(
            "No manifest at {}, treating every frame as already aligned",
            manifest_path.display()
        );
        RunManifest::default()
    };
    let stack = manifest
        .into_stack(&cli.input, &cli.non_propagating)
        .context("resolving frame list")?;

    if cli.dry_run {
        pipeline::validate_directories(&cli.input, &cli.output)?;
        let accumulated = pipeline::plan(&stack, &config)?;
        for (i, (name, transform)) in stack.names.iter().zip(&accumulated).enumerate() {
            let marker = if stack.non_propagating.contains(&(i + 1)) {
                " [non-propagating]"
            } else {
                ""
            };
            println!("{:>5} {:<32} {}{}", i + 1, name, transform, marker);
        }
        return Ok(());
    }

    let resampler = resample::from_config(&config);
    let progress: ProgressCallback = Arc::new(Mutex::new(|msg: String, pct: f32| {
        log::debug!("[{:5.1}%] {}", pct, msg);
    }));

    println!(
        "Aligning {} frames from {} into {}",
        stack.len(),
        cli.input.display(),
        cli.output.display()
    );
    match pipeline::run(
        &cli.input,
        &cli.output,
        &stack,
        &config,
        resampler.as_ref(),
        Some(progress),
    ) {
        Ok(report) => {
            println!(
                "✓ {} frames written in {:?} ({} copied, {} resampled)",
                report.summary.outcomes.len(),
                report.summary.elapsed,
                report.summary.count(FrameAction::Copied),
                report.summary.count(FrameAction::Resampled)
            );
            Ok(())
        }
        Err(AlignError::Batch(batch)) => {
            for failure in batch.root_causes() {
                println!("✗ Frame {} ({}): {}", failure.index, failure.name, failure.error);
            }
            Err(AlignError::Batch(batch).into())
        }
        Err(e) => Err(e.into()),
    }
}
