mod backend_bridge;
mod controller;
mod ui;

use clap::Parser;
use client_core::config::load_settings;
use crossbeam_channel::bounded;
use eframe::egui;
use tracing_subscriber::EnvFilter;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::UiEvent;
use crate::ui::{KmeansApp, StartupConfig};

#[derive(Parser, Debug)]
#[command(name = "kmeans_gui", about = "Interactive KMeans clustering front-end")]
struct Args {
    /// Engine base URL; overrides kmeans.toml and the environment.
    #[arg(long)]
    engine_url: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut settings = load_settings()?;
    if let Some(engine_url) = args.engine_url {
        settings.engine_url = engine_url;
    }
    tracing::info!(engine_url = %settings.engine_url, "starting kmeans gui");

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(16);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(256);
    backend_bridge::runtime::launch(settings.engine_url.clone(), cmd_rx, ui_tx);

    let surface = settings.surface_size();
    let config = StartupConfig {
        engine_url: settings.engine_url,
        surface,
    };
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("KMeans Clustering")
            .with_inner_size([surface.width.max(640.0) + 40.0, surface.height + 180.0])
            .with_min_inner_size([480.0, 360.0]),
        ..Default::default()
    };
    eframe::run_native(
        "KMeans Clustering",
        options,
        Box::new(move |_cc| Ok(Box::new(KmeansApp::new(config, cmd_tx, ui_rx)))),
    )
    .map_err(|err| anyhow::anyhow!("failed to run gui: {err}"))
}
