//! Backend commands queued from UI to backend worker.

use shared::protocol::{EngineIntent, EngineRequest};

pub enum BackendCommand {
    Send(EngineRequest),
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::Send(request) => request.intent().endpoint(),
        }
    }

    pub fn intent(&self) -> EngineIntent {
        match self {
            BackendCommand::Send(request) => request.intent(),
        }
    }
}
