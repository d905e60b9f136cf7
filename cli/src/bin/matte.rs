use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use matte_cli::{build_service, load_config, run_job, BatchJobs};
use matting::{build_trimap, Algorithm, AutoSegmentParams, MattingCommand, MattingParams};
use tokio::sync::Semaphore;
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Service configuration file (.toml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an alpha matte and foreground layer from an image and a rough mask
    Matte {
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long)]
        mask: PathBuf,
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Erosion disk diameter in pixels
        #[arg(long)]
        erosion: Option<u32>,
        /// Dilation disk diameter in pixels
        #[arg(long)]
        dilation: Option<u32>,
        /// Longest side of the working image
        #[arg(long)]
        max_size: Option<u32>,
        /// One of cf, knn, lbdm, lkm, vitmatte
        #[arg(short, long, value_parser = parse_algorithm)]
        algorithm: Option<Algorithm>,
        /// Skip foreground recovery
        #[arg(long)]
        no_foreground: bool,
    },
    /// Generate an alpha matte from an image and a ready trimap
    FromTrimap {
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long)]
        trimap: PathBuf,
        #[arg(short, long)]
        output_dir: PathBuf,
        #[arg(long)]
        max_size: Option<u32>,
        #[arg(short, long, value_parser = parse_algorithm)]
        algorithm: Option<Algorithm>,
    },
    /// Write the trimap built from a mask
    Trimap {
        #[arg(short, long)]
        mask: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value = "10")]
        erosion: u32,
        #[arg(long, default_value = "10")]
        dilation: u32,
    },
    /// Segment everything in an image with the configured model script
    Segment {
        #[arg(short, long)]
        image: PathBuf,
        /// Directory for the JSON result, segment masks and composite
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        points_per_side: Option<u32>,
        #[arg(long)]
        pred_iou_thresh: Option<f32>,
        #[arg(long)]
        stability_score_thresh: Option<f32>,
    },
    /// Run every job of a batch file (.toml or .json)
    Batch {
        #[arg(value_name = "JOBS")]
        jobs: PathBuf,
        /// Jobs processed concurrently
        #[arg(short = 'j', long, default_value = "2")]
        parallel: usize,
    },
    /// Print the JSON schema of the service commands
    Schema,
}

fn parse_algorithm(name: &str) -> std::result::Result<Algorithm, String> {
    Algorithm::parse(name).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Matte {
            image,
            mask,
            output_dir,
            erosion,
            dilation,
            max_size,
            algorithm,
            no_foreground,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            config.compute_foreground &= !no_foreground;
            let defaults = &config.matting;
            let params = MattingParams {
                erosion_kernel_size: erosion.unwrap_or(defaults.erosion_kernel_size),
                dilation_kernel_size: dilation.unwrap_or(defaults.dilation_kernel_size),
                max_size: max_size.unwrap_or(defaults.max_size),
                algorithm: algorithm.unwrap_or(defaults.algorithm),
            };
            let service = build_service(&config);
            let image_rgb = image::open(&image)?.to_rgb8();
            let mask = image::open(&mask)?.to_luma8();
            let result = service.pipeline().generate_matte(&image_rgb, &mask, &params)?;
            write_matte(&result, &output_dir, &stem(&image))?;
        }
        Commands::FromTrimap {
            image,
            trimap,
            output_dir,
            max_size,
            algorithm,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let service = build_service(&config);
            let image_rgb = image::open(&image)?.to_rgb8();
            let trimap = image::open(&trimap)?.to_luma8();
            let result = service.pipeline().matte_from_trimap(
                &image_rgb,
                &trimap,
                max_size.unwrap_or(config.matting.max_size),
                algorithm.unwrap_or(config.matting.algorithm),
            )?;
            write_matte(&result, &output_dir, &stem(&image))?;
        }
        Commands::Trimap {
            mask,
            output,
            erosion,
            dilation,
        } => {
            let mask = image::open(&mask)?.to_luma8();
            let trimap = build_trimap(&mask, erosion, dilation);
            let counts = trimap.counts();
            trimap.as_image().save(&output)?;
            info!(
                background = counts.background,
                unknown = counts.unknown,
                foreground = counts.foreground,
                "Trimap saved to {:?}",
                output
            );
        }
        Commands::Segment {
            image,
            output,
            points_per_side,
            pred_iou_thresh,
            stability_score_thresh,
        } => {
            let config = load_config(cli.config.as_deref())?;
            if config.models.is_none() {
                return Err(eyre!("Segmentation needs a [models] script in the configuration file"));
            }
            let defaults = &config.segmentation;
            let params = AutoSegmentParams {
                points_per_side: points_per_side.unwrap_or(defaults.points_per_side),
                pred_iou_thresh: pred_iou_thresh.unwrap_or(defaults.pred_iou_thresh),
                stability_score_thresh: stability_score_thresh.unwrap_or(defaults.stability_score_thresh),
            };
            let service = build_service(&config);
            let image_bytes = std::fs::read(&image)?;
            let result = service.auto_segment(&image_bytes, &params)?;

            let stem = stem(&image);
            std::fs::create_dir_all(&output)?;
            result.save_json(output.join(format!("{stem}.json")))?;
            result.write_rasters(&output, &stem)?;
            info!("Found {} segments, saved to {:?}", result.segments.len(), output);
        }
        Commands::Batch { jobs, parallel } => {
            run_batch(&jobs, cli.config.as_deref(), parallel).await?;
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&MattingCommand::schema())?);
        }
    }

    Ok(())
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

fn write_matte(result: &matting::MatteResult, output_dir: &Path, stem: &str) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    result.save_json(output_dir.join(format!("{stem}.json")))?;
    let paths = result.write_rasters(output_dir, stem)?;
    info!(
        algorithm = %result.algorithm,
        seconds = result.processing_time,
        "Alpha matte saved to {:?}",
        paths.alpha_matte
    );
    Ok(())
}

async fn run_batch(jobs_path: &Path, config_override: Option<&Path>, parallel: usize) -> Result<()> {
    let batch = BatchJobs::from_file(jobs_path)?;
    batch.validate()?;

    let config = load_config(config_override.or(batch.config.as_deref()))?;
    let service = build_service(&config);
    let defaults = config.matting.clone();
    let output_dir = batch.output_dir.clone();
    info!("Running {} jobs into {:?}", batch.jobs.len(), output_dir);

    let limit = Arc::new(Semaphore::new(parallel.max(1)));
    let mut handles = Vec::with_capacity(batch.jobs.len());
    for job in batch.jobs {
        let permit = limit.clone().acquire_owned().await?;
        let service = service.clone();
        let output_dir = output_dir.clone();
        let defaults = defaults.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let outcome = run_job(&service, &job, &output_dir, &defaults);
            (job.name, outcome)
        }));
    }

    let mut failed = 0;
    for handle in handles {
        let (name, outcome) = handle.await?;
        if let Err(e) = outcome {
            error!("Job '{}' failed: {}", name, e);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(eyre!("{failed} job(s) failed"));
    }
    info!("Batch completed");
    Ok(())
}
