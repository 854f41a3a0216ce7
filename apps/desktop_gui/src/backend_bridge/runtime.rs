//! Runtime bridge between UI command queue and backend event intake.

use std::thread;

use client_core::EngineClient;
use crossbeam_channel::{Receiver, Sender};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

pub fn launch(engine_url: String, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let _ = ui_tx.try_send(UiEvent::Info("Engine worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("engine worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build engine worker runtime: {err}");
                return;
            }
        };

        let client = match EngineClient::new(&engine_url) {
            Ok(client) => client,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("engine worker startup failure: {err}"),
                )));
                tracing::error!(%engine_url, "invalid engine url: {err}");
                return;
            }
        };
        let _ = ui_tx.try_send(UiEvent::Info(format!(
            "Engine worker ready ({})",
            client.base_url()
        )));

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                BackendCommand::Send(request) => {
                    let intent = request.intent();
                    tracing::debug!(%intent, "engine worker sending request");
                    let outcome = runtime.block_on(client.send(&request));
                    // Completions are never dropped: the session gate waits on them.
                    if ui_tx
                        .send(UiEvent::EngineCompleted { intent, outcome })
                        .is_err()
                    {
                        tracing::debug!("ui event channel closed; stopping engine worker");
                        break;
                    }
                }
            }
        }
        tracing::info!("engine worker stopped");
    });
}
