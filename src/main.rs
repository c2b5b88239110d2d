use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facepi::classifier::{self, BatchClassifier, ClassifyOptions, DeletePolicy};
use facepi::config::{self, Config};
use facepi::crop::{CropOptions, FaceCropper};
use facepi::engine::OrtEngine;
use facepi::gallery::{Gallery, GalleryBuilder};
use facepi::report::{self, Report};
use facepi::video::{self, FrameSampling};
use facepi::{blur, matcher, pose, storage, Error, MatchPolicy, ModelPaths};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "facepi")]
#[command(
    version,
    about = "Sort face images by identity against a folder of known faces"
)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample frames from a video file or a folder of videos with ffmpeg
    Extract {
        /// Video file or folder (searched recursively)
        input: PathBuf,
        /// Frames per second to sample
        #[arg(short, long)]
        fps: Option<u32>,
        /// Output folder for the frames
        #[arg(short, long, default_value = "images")]
        output: PathBuf,
    },
    /// Crop every detected face out of a folder of frames
    Crop {
        #[arg(default_value = "images")]
        input: PathBuf,
        #[arg(default_value = "faces")]
        output: PathBuf,
        /// Log the images in which no face was found
        #[arg(short = 'l', long)]
        list_no_face: bool,
        /// Permanently delete source images once processed; an interrupted
        /// run may already have deleted some of them
        #[arg(short, long)]
        delete: bool,
    },
    /// Embed the known faces and save the gallery snapshot
    Build {
        /// Folder holding one subfolder of reference images per person
        #[arg(short, long, default_value = "known_faces")]
        known: PathBuf,
    },
    /// Match a folder of face images against the known faces
    Classify(ClassifyArgs),
    /// List the sharpest images of a folder
    Blur {
        #[arg(default_value = "faces")]
        folder: PathBuf,
        /// Number of images to list
        #[arg(short = 'n', long, default_value_t = blur::DEFAULT_TOP)]
        top: usize,
    },
    /// Copy the most frontal faces of a folder into another folder
    Pose {
        #[arg(default_value = "faces")]
        folder: PathBuf,
        /// Folder receiving the selected images
        #[arg(short, long, default_value = "faces_front")]
        output: PathBuf,
        /// Number of images to keep
        #[arg(short = 'n', long, default_value_t = pose::DEFAULT_TOP)]
        top: usize,
    },
    /// Remove the gallery snapshot
    Purge,
    /// Open config file in editor
    Config {
        /// Write a config file with default values instead
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args)]
struct ClassifyArgs {
    /// Folder holding one subfolder of reference images per person
    #[arg(short, long, default_value = "known_faces")]
    known: PathBuf,
    /// Folder of face images to classify (searched recursively)
    #[arg(short, long, default_value = "faces")]
    faces: PathBuf,
    /// Maximum distance accepted as a match
    #[arg(short = 'c', long, value_parser = parse_threshold)]
    threshold: Option<f32>,
    /// Load the saved snapshot instead of rebuilding the gallery
    #[arg(short = 'j', long)]
    load_snapshot: bool,
    /// Also list the unmatched files in the report
    #[arg(short = 'l', long)]
    list_unmatched: bool,
    /// Permanently delete every unmatched image (no face or no match).
    /// Files are removed once all images are classified; an interrupted
    /// run may already have deleted some of them
    #[arg(short, long)]
    delete: bool,
    /// Permanently delete only the images in which no face was found.
    /// An interrupted run may already have deleted some of them
    #[arg(long)]
    delete_no_face: bool,
    /// Write the report to a timestamped file instead of stdout
    #[arg(short, long)]
    report: bool,
    /// Folder for report files
    #[arg(long, default_value = ".")]
    report_dir: PathBuf,
    /// Worker threads (defaults to the config value)
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, value_enum)]
    policy: Option<MatchPolicy>,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let cfg = config::load_config(config_path)?;

    match cli.command {
        Commands::Extract { input, fps, output } => extract(&cfg, &input, fps, &output),
        Commands::Crop {
            input,
            output,
            list_no_face,
            delete,
        } => crop(&cfg, &input, &output, list_no_face, delete),
        Commands::Build { known } => build(&cfg, &known),
        Commands::Classify(args) => classify(&cfg, args),
        Commands::Blur { folder, top } => rank_blur(&cfg, &folder, top),
        Commands::Pose {
            folder,
            output,
            top,
        } => rank_pose(&cfg, &folder, &output, top),
        Commands::Purge => purge(&cfg),
        Commands::Config { init: true } => init_config(config_path),
        Commands::Config { init: false } => open_config(config_path),
    }
}

fn parse_threshold(s: &str) -> std::result::Result<f32, String> {
    let threshold: f32 = s.parse().map_err(|e| format!("{}", e))?;
    matcher::check_threshold(threshold).map_err(|e| e.to_string())
}

fn require_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(Error::MissingDirectory(path.to_path_buf()).into());
    }
    Ok(())
}

fn load_engine(cfg: &Config, workers: usize) -> Result<OrtEngine> {
    OrtEngine::new(&ModelPaths::from(&cfg.models), cfg.detection.into(), workers)
}

fn extract(cfg: &Config, input: &Path, fps: Option<u32>, output: &Path) -> Result<()> {
    let start = Instant::now();
    let mut sampling = FrameSampling::from_config(&cfg.extract);
    if let Some(fps) = fps {
        sampling.fps = fps;
    }
    let stats = video::extract_frames(input, output, &sampling)
        .context("Failed to extract frames")?;
    info!(
        "Processed {} video(s), {} failed, in {:.2}s",
        stats.videos,
        stats.failed,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn crop(cfg: &Config, input: &Path, output: &Path, list_no_face: bool, delete: bool) -> Result<()> {
    require_dir(input)?;
    let workers = cfg.worker_count();
    let engine = load_engine(cfg, workers)?;
    let options = CropOptions {
        min_face_size: cfg.min_face_size,
        extensions: cfg.extensions.clone(),
        workers,
        list_no_face,
        delete_source: delete,
    };
    FaceCropper::new(&engine, options).run(input, output)?;
    Ok(())
}

fn build(cfg: &Config, known: &Path) -> Result<()> {
    require_dir(known)?;
    let workers = cfg.worker_count();
    let engine = load_engine(cfg, workers)?;
    GalleryBuilder::new(&engine, cfg.extensions.clone(), workers)
        .build_and_save(known, &cfg.snapshot)
        .context("Failed to build gallery")?;
    Ok(())
}

fn classify(cfg: &Config, args: ClassifyArgs) -> Result<()> {
    let start = Instant::now();

    let mut options = ClassifyOptions::from(cfg);
    if let Some(threshold) = args.threshold {
        options.threshold = threshold;
    }
    if let Some(policy) = args.policy {
        options.policy = policy;
    }
    if let Some(workers) = args.workers {
        options.workers = workers.max(1);
    }

    require_dir(&args.faces)?;
    if !args.load_snapshot {
        require_dir(&args.known)?;
    }
    // a corrupt snapshot fails before the models are loaded
    let snapshot: Option<Gallery> = if args.load_snapshot {
        Some(storage::load_gallery(&cfg.snapshot)?)
    } else {
        None
    };

    let engine = load_engine(cfg, options.workers)?;
    let gallery = match snapshot {
        Some(gallery) => gallery,
        None => GalleryBuilder::new(&engine, options.extensions.clone(), options.workers)
            .build_and_save(&args.known, &cfg.snapshot)?,
    };
    if gallery.is_empty() {
        warn!("No known faces; every image will be unmatched");
    }

    let results = BatchClassifier::new(&engine, Arc::new(gallery), options).classify_dir(&args.faces)?;

    let policy = DeletePolicy {
        no_face: args.delete || args.delete_no_face,
        unmatched: args.delete,
    };
    let deleted = classifier::apply_deletions(&results, policy);
    if deleted > 0 {
        info!("Deleted {} unmatched image(s)", deleted);
    }

    let report = Report::from_results(&results);
    let elapsed = start.elapsed().as_secs_f64();
    if args.report {
        let (path, mut file) =
            report::create_report_file(&args.report_dir).context("Failed to create report file")?;
        write_report(&mut file, &report, args.list_unmatched, elapsed)?;
        info!("Report written to {}", path.display());
    } else {
        let stdout = std::io::stdout();
        write_report(&mut stdout.lock(), &report, args.list_unmatched, elapsed)?;
    }
    Ok(())
}

fn write_report<W: Write>(out: &mut W, report: &Report, list_unmatched: bool, elapsed: f64) -> Result<()> {
    report.render(out, list_unmatched)?;
    writeln!(out, "Processing completed in {:.2} seconds.", elapsed)?;
    out.flush()?;
    Ok(())
}

fn rank_blur(cfg: &Config, folder: &Path, top: usize) -> Result<()> {
    let scores = blur::rank(folder, &cfg.extensions, cfg.worker_count(), top)?;
    let stdout = std::io::stdout();
    blur::render_table(&scores, &mut stdout.lock())?;
    Ok(())
}

fn rank_pose(cfg: &Config, folder: &Path, output: &Path, top: usize) -> Result<()> {
    require_dir(folder)?;
    let workers = cfg.worker_count();
    let engine = load_engine(cfg, workers)?;
    let scores = pose::rank(&engine, folder, &cfg.extensions, workers, top)?;
    let copied = pose::copy_ranked(&scores, output).context("Failed to copy selected faces")?;
    info!("✓ Copied {} frontal face(s) to {}", copied, output.display());
    Ok(())
}

fn purge(cfg: &Config) -> Result<()> {
    info!("Purging gallery snapshot: {}", cfg.snapshot.display());

    if storage::purge(&cfg.snapshot).context("Failed to purge snapshot")? {
        info!("✓ Snapshot removed");
    } else {
        info!("No snapshot to remove");
    }
    Ok(())
}

fn init_config(path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(config::CONFIG_PATH.as_path());
    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }
    config::save_config(&Config::default(), Some(path)).context("Failed to write config file")?;
    info!("✓ Default config written to {}", path.display());
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(config::CONFIG_PATH.as_path());
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {}", config_path.display());

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
