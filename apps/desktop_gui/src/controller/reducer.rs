//! Reducer-like application of session effects on the UI thread.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use client_core::{EngineError, Notice, NoticeSeverity, SessionController, SessionEffect};
use crossbeam_channel::Sender;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::UiError;
use crate::controller::orchestration::dispatch_backend_command;

pub const NOTICE_LOG_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct NoticeEntry {
    pub at: DateTime<Local>,
    pub severity: NoticeSeverity,
    pub text: String,
}

/// Timestamped notice history plus the banner currently shown above the canvas.
#[derive(Debug, Default)]
pub struct NoticeFeed {
    entries: VecDeque<NoticeEntry>,
    banner: Option<UiError>,
}

impl NoticeFeed {
    pub fn push(&mut self, notice: &Notice) {
        if let Some(err) = UiError::from_notice(notice) {
            self.banner = Some(err);
        }
        self.record(notice.severity(), notice.to_string());
    }

    pub fn push_error(&mut self, err: UiError) {
        self.record(NoticeSeverity::Error, err.message().to_string());
        self.banner = Some(err);
    }

    pub fn push_info(&mut self, text: impl Into<String>) {
        self.record(NoticeSeverity::Info, text.into());
    }

    fn record(&mut self, severity: NoticeSeverity, text: String) {
        if self.entries.len() == NOTICE_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(NoticeEntry {
            at: Local::now(),
            severity,
            text,
        });
    }

    /// Oldest first.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &NoticeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn banner(&self) -> Option<&UiError> {
        self.banner.as_ref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub redraw: bool,
    pub dispatched: usize,
}

/// Carry out session effects: requests go to the engine worker, notices to the feed.
///
/// A request that cannot be queued is completed immediately with
/// `EngineError::Dispatch` so the session never waits on a reply that will not come.
pub fn apply_effects(
    session: &mut SessionController,
    effects: Vec<SessionEffect>,
    cmd_tx: &Sender<BackendCommand>,
    status: &mut String,
    feed: &mut NoticeFeed,
) -> Applied {
    let mut applied = Applied::default();
    let mut queue: VecDeque<SessionEffect> = effects.into();

    while let Some(effect) = queue.pop_front() {
        match effect {
            SessionEffect::Dispatch(request) => {
                let intent = request.intent();
                if dispatch_backend_command(cmd_tx, BackendCommand::Send(request), status) {
                    applied.dispatched += 1;
                } else {
                    let reason = status.clone();
                    let outcome = Err(EngineError::Dispatch { intent, reason });
                    queue.extend(session.complete(intent, outcome));
                }
            }
            SessionEffect::Notify(notice) => {
                *status = notice.to_string();
                feed.push(&notice);
            }
            SessionEffect::Redraw => applied.redraw = true,
        }
    }
    applied
}
