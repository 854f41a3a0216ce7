use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::load_settings, drive, mapping::to_screen, DriveReport, EngineClient, EngineImage,
    NoticeSeverity, SessionController, SessionEffect, SessionPhase,
};
use shared::domain::{ClusterCount, DataPoint, InitMethod};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kmeans_cli", about = "Drive a KMeans engine from the terminal")]
struct Args {
    /// Engine base URL; overrides kmeans.toml and the environment.
    #[arg(long)]
    engine_url: Option<String>,
    #[arg(long, default_value_t = 1)]
    k: u32,
    /// Random, Farthest, KMeans++ or Manual.
    #[arg(long, default_value = "Random")]
    init: InitMethod,
    /// Manual centroid in data coordinates, as `x,y`. Repeat once per cluster.
    #[arg(long = "centroid", value_parser = parse_centroid)]
    centroids: Vec<DataPoint>,
    #[arg(long, default_value_t = 50)]
    max_steps: usize,
    /// Directory for returned frames; overrides the configured `out_dir`.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Step until the engine reports convergence or `--max-steps` is reached.
    Step,
    /// Ask the engine to run to convergence in one call.
    Converge,
    /// Reset the algorithm on a fresh dataset.
    Reset,
}

fn parse_centroid(raw: &str) -> Result<DataPoint, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{raw}`"))?;
    let x: f64 = x
        .trim()
        .parse()
        .map_err(|err| format!("invalid x in `{raw}`: {err}"))?;
    let y: f64 = y
        .trim()
        .parse()
        .map_err(|err| format!("invalid y in `{raw}`: {err}"))?;
    if !(x.is_finite() && y.is_finite()) {
        return Err(format!("centroid `{raw}` must be finite"));
    }
    Ok(DataPoint::new(x, y))
}

struct FrameSink {
    dir: PathBuf,
    written: usize,
}

impl FrameSink {
    fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create frame directory '{}'", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    fn write(&mut self, image: &EngineImage) -> Result<PathBuf> {
        let path = self.dir.join(format!("frame_{:03}.png", self.written));
        fs::write(&path, image.bytes())
            .with_context(|| format!("failed to write frame '{}'", path.display()))?;
        self.written += 1;
        Ok(path)
    }
}

/// Drive one action to completion, saving any new frame and surfacing notices.
async fn run_action(
    session: &mut SessionController,
    engine: &EngineClient,
    effects: Vec<SessionEffect>,
    frames: &mut FrameSink,
) -> Result<DriveReport> {
    let report = drive(session, engine, effects).await;

    if report.redraws > 0 {
        if let Some(image) = session.state().last_image() {
            let path = frames.write(image)?;
            println!("wrote {}", path.display());
        }
    }
    for notice in &report.notices {
        match notice.severity() {
            NoticeSeverity::Info => println!("{notice}"),
            NoticeSeverity::Warning => eprintln!("warning: {notice}"),
            NoticeSeverity::Error => eprintln!("error: {notice}"),
        }
    }
    if let Some(notice) = report
        .notices
        .iter()
        .find(|notice| notice.severity() == NoticeSeverity::Error)
    {
        bail!("{notice}");
    }
    Ok(report)
}

async fn place_manual_centroids(
    session: &mut SessionController,
    engine: &EngineClient,
    centroids: &[DataPoint],
    frames: &mut FrameSink,
) -> Result<()> {
    let surface = session.surface_size();
    for &centroid in centroids {
        let at = to_screen(centroid, session.state().axis_limits(), surface)
            .context("manual centroids need a dataset with axis limits")?;
        let before = session.state().centroids().len();
        let effects = session.place_centroid(at);
        run_action(session, engine, effects, frames).await?;
        if session.state().centroids().len() == before {
            bail!(
                "centroid ({}, {}) lies outside the dataset range",
                centroid.x,
                centroid.y
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings()?;
    if let Some(engine_url) = args.engine_url {
        settings.engine_url = engine_url;
    }
    if let Some(out_dir) = args.out_dir {
        settings.out_dir = out_dir;
    }

    let k = ClusterCount::new(args.k).context("--k must be at least 1")?;
    if args.init.is_manual() && args.centroids.len() != k.as_usize() {
        bail!(
            "Manual initialization needs exactly {k} --centroid values ({} given)",
            args.centroids.len()
        );
    }
    if !args.init.is_manual() && !args.centroids.is_empty() {
        tracing::warn!(init = %args.init, "ignoring --centroid values for a non-manual method");
    }

    let engine = EngineClient::new(&settings.engine_url)?;
    let mut frames = FrameSink::create(&settings.out_dir)?;
    let mut session = SessionController::with_parameters(settings.surface_size(), k, args.init);
    tracing::info!(
        engine_url = %engine.base_url(),
        %k,
        init = %args.init,
        command = ?args.command,
        "starting kmeans session"
    );

    let effects = session.generate_dataset();
    run_action(&mut session, &engine, effects, &mut frames).await?;
    if let Some(dataset) = session.state().dataset() {
        println!("dataset: {} points", dataset.points().len());
    }

    if args.init.is_manual() {
        place_manual_centroids(&mut session, &engine, &args.centroids, &mut frames).await?;
    }

    match args.command {
        Command::Step => {
            for _ in 0..args.max_steps {
                let effects = session.step();
                run_action(&mut session, &engine, effects, &mut frames).await?;
                if session.phase() == SessionPhase::Converged {
                    break;
                }
            }
            if session.phase() != SessionPhase::Converged {
                println!("stopped after {} steps without convergence", args.max_steps);
            }
        }
        Command::Converge => {
            let effects = session.converge();
            run_action(&mut session, &engine, effects, &mut frames).await?;
        }
        Command::Reset => {
            let effects = session.reset();
            run_action(&mut session, &engine, effects, &mut frames).await?;
        }
    }

    println!(
        "phase: {}; frames written: {} ({})",
        session.phase().label(),
        frames.written,
        frames.dir.display()
    );
    Ok(())
}
