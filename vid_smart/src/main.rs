use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use shared_utils::batch::{collect_task_pairs, has_extension, SUPPORTED_VIDEO_EXTENSIONS};
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::thread_manager::score_stage_allocation;
use shared_utils::SmartError;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

use shared_utils::results_table::ResultsTable;
use vid_smart::analyze::DEFAULT_COMPRESSED_DIRS;
use vid_smart::{
    analyze_directories, check_vmaf_support, get_encoder, print_summary, CandidateScorer,
    Compressor, EncodePermit, SchedulerConfig, SizeBreachPolicy, SmartScheduler, VmafScorer,
};

#[derive(Parser)]
#[command(name = "vid-smart")]
#[command(version, about = "VMAF-targeted adaptive HEVC compression", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum EncoderArg {
    Intel,
    Nvidia,
    Mac,
}

impl EncoderArg {
    fn name(self) -> &'static str {
        match self {
            EncoderArg::Intel => "intel",
            EncoderArg::Nvidia => "nvidia",
            EncoderArg::Mac => "mac",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file or every video under a directory
    Run {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
        #[arg(short, long, value_enum)]
        encoder: EncoderArg,
        /// Minimum VMAF score to accept
        #[arg(long, default_value_t = 95.0)]
        target_vmaf: f64,
        /// Maximum output/input size ratio
        #[arg(long, default_value_t = 0.8)]
        size_limit: f64,
        /// Parallel VMAF workers (default: balanced for this machine)
        #[arg(long)]
        analyze_workers: Option<usize>,
        /// Concurrent hardware encodes
        #[arg(long, default_value_t = 1)]
        encode_workers: usize,
        #[arg(long)]
        use_neg_model: bool,
        /// Keep the best-effort candidate when the size limit is hit
        #[arg(long)]
        retreat_on_size_breach: bool,
        /// Append FileSpec/VMAF/Bitrate rows to this TSV file
        #[arg(long, value_name = "FILE")]
        results: Option<PathBuf>,
        #[arg(short, long)]
        recursive: bool,
        #[arg(short, long)]
        verbose: bool,
    },

    /// Score already-compressed files against their sources into a TSV table
    Analyze {
        /// Directory holding the source videos
        #[arg(long, default_value = "Videos")]
        ref_dir: PathBuf,
        /// Directories of compressed videos
        #[arg(long, num_args = 1.., default_values = DEFAULT_COMPRESSED_DIRS)]
        comp_dirs: Vec<String>,
        /// Result table; FileSpecs already in it are skipped
        #[arg(long, default_value = "Results/FFMetrics.Results.csv")]
        output: PathBuf,
        /// Files scored in parallel
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
        #[arg(long)]
        use_neg_model: bool,
        #[arg(long, default_value = "ffmpeg")]
        ffmpeg: String,
        #[arg(long, default_value = "ffprobe")]
        ffprobe: String,
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print bitrate, resolution and the VMAF model that would be used
    Probe {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        use_neg_model: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output,
            encoder,
            target_vmaf,
            size_limit,
            analyze_workers,
            encode_workers,
            use_neg_model,
            retreat_on_size_breach,
            results,
            recursive,
            verbose,
        } => {
            let level = if verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            };
            if let Err(e) = init_logging("vid_smart", LogConfig::default().with_level(level)) {
                eprintln!("⚠️  Could not initialize logging: {:#}", e);
            }

            require_tool("ffmpeg")?;
            require_tool("ffprobe")?;
            if !check_vmaf_support("ffmpeg") {
                warn!("⚠️  ffmpeg has no libvmaf filter; every score will be unavailable and outputs will fall back to the source");
            }

            let allocation = score_stage_allocation(
                analyze_workers.unwrap_or(shared_utils::thread_manager::DEFAULT_MAX_SCORE_WORKERS),
            );
            let score_workers = analyze_workers.unwrap_or(allocation.parallel_tasks);

            let mut config = SchedulerConfig::new()
                .with_target_score(target_vmaf)
                .with_size_limit(size_limit)
                .with_encode_workers(encode_workers)
                .with_score_workers(score_workers);
            if retreat_on_size_breach {
                config = config.with_size_breach_policy(SizeBreachPolicy::RetreatToBestEffort);
            }
            if let Some(path) = results {
                config = config.with_results_table(path);
            }
            config.validate()?;

            let profile = get_encoder(encoder.name())?;
            let permit = Arc::new(EncodePermit::new(config.encode_workers));
            let compressor = Compressor::new(profile).with_permit(permit);
            let scorer = VmafScorer::new()
                .with_threads(allocation.child_threads)
                .with_neg_model(use_neg_model)
                .with_metric(config.metric_name.clone());

            let pairs = build_pairs(&input, &output, recursive)?;
            if pairs.is_empty() {
                warn!(input = %input.display(), "No videos found");
                return Ok(());
            }

            info!("🎬 Adaptive VMAF compression");
            info!("   Encoder: {}", encoder.name());
            info!("   Target VMAF: {:.1}", config.target_score);
            info!("   Size limit: {:.2}", config.size_limit);
            info!(
                "   Workers: {} encode / {} analyze ({} threads each)",
                config.encode_workers, config.score_workers, allocation.child_threads
            );
            info!("   Files: {}", pairs.len());

            let metric = config.metric_name.clone();
            let scheduler = SmartScheduler::new(Arc::new(compressor), Arc::new(scorer), config);
            let shutdown = scheduler.shutdown_handle();
            if let Err(e) = ctrlc::set_handler(move || {
                eprintln!("\n⚠️  Interrupt received, finishing current steps...");
                shutdown.store(true, Ordering::SeqCst);
            }) {
                warn!(error = %e, "Could not install Ctrl-C handler");
            }

            let results = scheduler.run(pairs);
            print_summary(&results, &metric);
        }

        Commands::Analyze {
            ref_dir,
            comp_dirs,
            output,
            jobs,
            use_neg_model,
            ffmpeg,
            ffprobe,
            verbose,
        } => {
            let level = if verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            };
            if let Err(e) = init_logging("vid_smart", LogConfig::default().with_level(level)) {
                eprintln!("⚠️  Could not initialize logging: {:#}", e);
            }

            require_tool(&ffmpeg)?;
            require_tool(&ffprobe)?;
            if !check_vmaf_support(&ffmpeg) {
                bail!("{} has no libvmaf filter", ffmpeg);
            }
            if !ref_dir.is_dir() {
                bail!(SmartError::InputMissing(ref_dir));
            }

            let jobs = jobs.max(1);
            let allocation = score_stage_allocation(jobs);
            let scorer = VmafScorer::new()
                .with_ffmpeg_bin(ffmpeg)
                .with_ffprobe_bin(ffprobe)
                .with_threads(allocation.child_threads)
                .with_neg_model(use_neg_model);
            let table = ResultsTable::new(&output, "VMAF");
            let comp_dirs: Vec<PathBuf> = comp_dirs.into_iter().map(PathBuf::from).collect();

            info!("📊 VMAF analysis");
            info!("   Reference: {}", ref_dir.display());
            info!("   Jobs: {} ({} threads each)", jobs, allocation.child_threads);
            info!("   Output: {}", output.display());

            let summary = analyze_directories(&scorer, &ref_dir, &comp_dirs, &table, jobs)?;
            println!(
                "{} files: {} already recorded, {} without reference, {} unscored, {} rows written to {}",
                summary.found,
                summary.already_recorded,
                summary.unmatched,
                summary.unscored,
                summary.written,
                output.display()
            );
        }

        Commands::Probe {
            file,
            use_neg_model,
        } => {
            require_tool("ffprobe")?;
            if !file.is_file() {
                return Err(SmartError::InputMissing(file).into());
            }
            let scorer = VmafScorer::new().with_neg_model(use_neg_model);

            println!("File:       {}", file.display());
            match scorer.bitrate(&file) {
                Some(kbps) => println!("Bitrate:    {:.2} kbps", kbps),
                None => println!("Bitrate:    unavailable"),
            }
            match scorer.resolution(&file) {
                Some((w, h)) => println!("Resolution: {}x{}", w, h),
                None => println!("Resolution: unavailable"),
            }
            println!("VMAF model: {}", scorer.select_model(&file, use_neg_model));
        }
    }

    Ok(())
}

fn require_tool(name: &str) -> anyhow::Result<()> {
    which::which(name)
        .map(|_| ())
        .map_err(|_| SmartError::ToolNotFound(name.to_string()))
        .with_context(|| format!("{} must be installed and on PATH", name))
}

/// One pair for a file input, a mirrored tree for a directory input
fn build_pairs(
    input: &Path,
    output: &Path,
    recursive: bool,
) -> anyhow::Result<Vec<(PathBuf, PathBuf)>> {
    if input.is_dir() {
        return Ok(collect_task_pairs(input, output, recursive));
    }
    if !input.is_file() {
        bail!(SmartError::InputMissing(input.to_path_buf()));
    }
    if !has_extension(input, SUPPORTED_VIDEO_EXTENSIONS) {
        warn!(input = %input.display(), "Unrecognized video extension, processing anyway");
    }

    let target = if output.is_dir() || output.extension().is_none() {
        output.join(input.file_name().unwrap_or_default())
    } else {
        output.to_path_buf()
    };
    Ok(vec![(input.to_path_buf(), target)])
}
