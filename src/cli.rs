use crate::{
    batch::{Batch, JobInput},
    config::Config,
    driver::{Driver, chrome::ChromeDriver},
    report::BatchStatus,
    util::{ensure_dir, file_stem_lossy, hash_file, sha256_hex},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "photoglot")]
#[command(about = "Browser-driven image translation orchestrator (Google Translate image mode)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./photoglot.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Doctor {},
    Run {
        /// Input image; repeat the flag to translate several in order.
        #[arg(long, required = true)]
        input: Vec<PathBuf>,
        /// Source language code, or `auto`.
        #[arg(long)]
        source: Option<String>,
        /// Target language code.
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub async fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let cfg = Config::load(&cfg_path)?;

    match &args.cmd {
        Command::Doctor {} => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            doctor(&cfg).await
        }
        Command::Run {
            input,
            source,
            target,
            out_dir,
        } => {
            run(
                &args,
                &cfg,
                input,
                source.as_deref(),
                target.as_deref(),
                out_dir.as_deref(),
            )
            .await
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("photoglot.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("photoglot.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

async fn doctor(cfg: &Config) -> Result<()> {
    let driver = ChromeDriver::new(cfg)?;
    let diag = driver.doctor().await?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(())
}

async fn run(
    args: &Args,
    cfg: &Config,
    inputs: &[PathBuf],
    source: Option<&str>,
    target: Option<&str>,
    out_override: Option<&Path>,
) -> Result<()> {
    let source = source.unwrap_or(cfg.batch.source_lang.as_str());
    let target = target.unwrap_or(cfg.batch.target_lang.as_str());
    validate_langs(source, target)?;

    let jobs = validate_inputs(cfg, inputs)?;

    let cfg_norm = cfg.normalized_for_hash();
    let cfg_hash = sha256_hex(cfg_norm.as_bytes());
    let mut seed = cfg_hash;
    for job in &jobs {
        seed.push(':');
        seed.push_str(&job.input_sha256);
    }
    let batch_id = sha256_hex(seed.as_bytes());

    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    let batch_dir = out_root.join(&batch_id);

    if batch_dir.exists() && !cfg.global.resume {
        return Err(anyhow!(
            "batch_dir already exists and resume=false: {}",
            batch_dir.display()
        ));
    }

    ensure_dir(&batch_dir)?;
    ensure_dir(&batch_dir.join("logs"))?;

    let log_path = resolve_log_path(cfg, Some(&batch_dir));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    info!(
        "batch_id={batch_id} jobs={} sl={source} tl={target} out={}",
        jobs.len(),
        batch_dir.display()
    );

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(batch_dir.join("effective-config.toml"), raw)?;
    }

    let driver = ChromeDriver::new(cfg)?;
    let batch = Batch::new(cfg, driver);

    let mut output = batch.run(&jobs, source, target).await?;

    for outcome in &mut output.jobs {
        let Some(image) = &outcome.image else { continue };
        let name = format!(
            "{}_{:03}_{}.png",
            cfg.output.image_prefix,
            outcome.record.index + 1,
            file_stem_lossy(Path::new(&outcome.record.filename))
        );
        std::fs::write(batch_dir.join(&name), image)
            .with_context(|| format!("writing {name}"))?;
        outcome.record.output_file = Some(name);
    }

    let manifest = output.manifest(&batch_id);

    if cfg.output.write_manifest_json {
        std::fs::write(
            batch_dir.join(&cfg.output.manifest_filename),
            serde_json::to_string_pretty(&manifest)?,
        )?;
    }

    if cfg.output.write_index_json {
        let index = serde_json::json!({
            "batch_id": batch_id,
            "started": manifest.started,
            "finished": manifest.finished,
            "total": manifest.total,
            "succeeded": manifest.succeeded,
            "failed": manifest.failed,
            "manifest": cfg.output.manifest_filename,
        });
        std::fs::write(
            batch_dir.join("index.json"),
            serde_json::to_string_pretty(&index)?,
        )?;
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "batch_id": batch_id,
                "batch_dir": batch_dir,
                "total": manifest.total,
                "succeeded": manifest.succeeded,
                "failed": manifest.failed,
                "status": manifest.status,
            }))?
        );
    }

    if manifest.status == BatchStatus::AllFailed {
        return Err(anyhow!("no job succeeded ({} attempted)", manifest.total));
    }

    Ok(())
}

fn validate_langs(source: &str, target: &str) -> Result<()> {
    let shape = Regex::new(r"^[a-z]{2,3}(-[A-Za-z]{2,4})?$")?;
    if source != "auto" && !shape.is_match(source) {
        return Err(anyhow!("invalid source language code: {source}"));
    }
    if target == "auto" || !shape.is_match(target) {
        return Err(anyhow!("invalid target language code: {target}"));
    }
    Ok(())
}

fn validate_inputs(cfg: &Config, inputs: &[PathBuf]) -> Result<Vec<JobInput>> {
    if inputs.is_empty() {
        return Err(anyhow!("no input images given"));
    }

    let mut jobs = Vec::with_capacity(inputs.len());
    for (index, path) in inputs.iter().enumerate() {
        let display = path.display().to_string();

        if cfg.security.reject_url_inputs && looks_like_url(&display) {
            return Err(anyhow!("URL inputs are disabled: {display}"));
        }

        if !path.exists() {
            return Err(anyhow!("input does not exist: {display}"));
        }

        if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
            let ext = ext.to_ascii_lowercase();
            if !cfg
                .limits
                .allowed_extensions
                .iter()
                .any(|a| a.eq_ignore_ascii_case(&ext))
            {
                return Err(anyhow!("unsupported input extension .{ext}: {display}"));
            }
        } else {
            warn!("input has no extension: {display}");
        }

        let meta = std::fs::metadata(path).with_context(|| format!("stat {display}"))?;
        if meta.len() > cfg.limits.max_input_bytes {
            return Err(anyhow!(
                "input exceeds max_input_bytes ({} > {}): {display}",
                meta.len(),
                cfg.limits.max_input_bytes
            ));
        }

        let input_sha256 = hash_file(path).with_context(|| format!("hashing {display}"))?;
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("input_{index}"));

        jobs.push(JobInput {
            index,
            filename,
            path: path.clone(),
            input_sha256,
        });
    }

    Ok(jobs)
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}

fn resolve_log_path(cfg: &Config, batch_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(batch_dir) = batch_dir {
        return Some(batch_dir.join("logs").join("photoglot.log"));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("photoglot.log"))
}
