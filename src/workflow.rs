//! Upload → select → analyze → reset workflow.
//!
//! [`Workflow`] is a pure state machine: every trigger either changes state
//! and (maybe) hands back a [`Command`] for the caller to execute, or records
//! a [`WorkflowError`] and leaves the state alone. Network results come back
//! in through [`Workflow::complete`].
//!
//! Each upload/analyze/health request carries a token. Only the completion
//! whose token matches the request currently in flight is applied; anything
//! else (e.g. a response arriving after a reset) is dropped.

use crate::error::{ErrorScope, ServiceError, WorkflowError};
use crate::types::*;
use crate::upload_slots::UploadSlots;
use log::{debug, info, warn};
use std::fmt;

pub type Token = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    FilesSelected,
    Uploading,
    BeatsAvailable,
    Analyzing,
    AnalysisComplete,
}

impl WorkflowState {
    /// A request is in flight and the matching triggers are locked.
    pub fn is_busy(self) -> bool {
        matches!(self, WorkflowState::Uploading | WorkflowState::Analyzing)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowState::Idle => "Idle",
            WorkflowState::FilesSelected => "FilesSelected",
            WorkflowState::Uploading => "Uploading",
            WorkflowState::BeatsAvailable => "BeatsAvailable",
            WorkflowState::Analyzing => "Analyzing",
            WorkflowState::AnalysisComplete => "AnalysisComplete",
        };
        f.write_str(s)
    }
}

/// A network request the workflow wants issued.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    HealthCheck { token: Token },
    Upload { token: Token, slots: UploadSlots },
    Analyze { token: Token, session_id: String, beat_index: usize },
    /// Best-effort; its outcome is only logged.
    Cleanup { session_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Health(Result<HealthStatus, ServiceError>),
    Upload(Result<UploadResponse, ServiceError>),
    Analyze(Result<AnalysisResult, ServiceError>),
    Cleanup {
        session_id: String,
        result: Result<CleanupReceipt, ServiceError>,
    },
}

/// Result of executing a [`Command`], tagged with the command's token.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub token: Token,
    pub outcome: Outcome,
}

/// Which triggers are currently enabled. Disabled triggers should be shown
/// as unavailable, not merely ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Actions {
    pub select_files: bool,
    pub upload: bool,
    pub select_beat: bool,
    pub analyze: bool,
    pub analyze_another: bool,
    pub reset: bool,
}

/// Read-only view of the workflow for observers.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: WorkflowState,
    pub backend_healthy: bool,
    pub missing_slots: Vec<SlotKind>,
    pub session_id: Option<String>,
    pub total_beats: usize,
    pub preview_count: usize,
    pub selection: Option<i64>,
    pub result: Option<AnalysisResult>,
    pub error: Option<WorkflowError>,
    pub actions: Actions,
    /// User actions applied by the runner before this snapshot (0 outside a runner).
    pub seq: u64,
}

pub const MSG_MISSING_FILES: &str = "Please upload all 4 required files (.atr, .dat, .hea, .xws)";
pub const MSG_NO_SELECTION: &str = "Please select a beat to analyze";
pub const MSG_REFERENCE_NOT_LOADED: &str =
    "Backend Normal reference not loaded. Please check the server.";
pub const MSG_BACKEND_DOWN: &str =
    "Backend server is not running. Please start the analysis server.";

pub fn beat_range_message(total_beats: usize) -> String {
    format!(
        "Beat index must be between 0 and {}",
        total_beats as i64 - 1
    )
}

pub struct Workflow {
    state: WorkflowState,
    slots: UploadSlots,
    session: Option<Session>,
    selection: Option<i64>,
    result: Option<AnalysisResult>,
    error: Option<WorkflowError>,
    health: Option<HealthStatus>,
    backend_healthy: bool,
    next_token: Token,
    pending_health: Option<Token>,
    pending_upload: Option<Token>,
    pending_analyze: Option<Token>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Idle,
            slots: UploadSlots::new(),
            session: None,
            selection: None,
            result: None,
            error: None,
            health: None,
            backend_healthy: false,
            next_token: 1,
            pending_health: None,
            pending_upload: None,
            pending_analyze: None,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn slots(&self) -> &UploadSlots {
        &self.slots
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn selection(&self) -> Option<i64> {
        self.selection
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        self.error.as_ref()
    }

    pub fn health(&self) -> Option<&HealthStatus> {
        self.health.as_ref()
    }

    pub fn backend_healthy(&self) -> bool {
        self.backend_healthy
    }

    pub fn available_actions(&self) -> Actions {
        let s = self.state;
        Actions {
            select_files: matches!(s, WorkflowState::Idle | WorkflowState::FilesSelected),
            upload: s == WorkflowState::FilesSelected
                && self.slots.is_ready()
                && self.backend_healthy,
            select_beat: s == WorkflowState::BeatsAvailable,
            analyze: s == WorkflowState::BeatsAvailable && self.selection.is_some(),
            analyze_another: s == WorkflowState::AnalysisComplete,
            reset: s != WorkflowState::Idle || self.error.is_some(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            backend_healthy: self.backend_healthy,
            missing_slots: self.slots.missing(),
            session_id: self.session.as_ref().map(|s| s.session_id.clone()),
            total_beats: self.session.as_ref().map_or(0, |s| s.total_beats),
            preview_count: self.session.as_ref().map_or(0, |s| s.beat_previews.len()),
            selection: self.selection,
            result: self.result.clone(),
            error: self.error.clone(),
            actions: self.available_actions(),
            seq: 0,
        }
    }

    // ─── Triggers ───────────────────────────────────────────────────────

    /// Initial health probe. Issued once when the workflow starts.
    pub fn start(&mut self) -> Command {
        self.refresh_health()
    }

    /// Explicit re-probe of the backend. Never issued automatically.
    pub fn refresh_health(&mut self) -> Command {
        let token = self.issue_token();
        self.pending_health = Some(token);
        Command::HealthCheck { token }
    }

    pub fn select_file(&mut self, kind: SlotKind, file: UploadFile) {
        if !matches!(self.state, WorkflowState::Idle | WorkflowState::FilesSelected) {
            self.reject("Reset the current analysis before selecting new files");
            return;
        }
        debug!("Slot {} ← {}", kind, file.name);
        self.slots.set_slot(kind, file);
        self.state = WorkflowState::FilesSelected;
        // Connectivity and server errors outlive a new file pick.
        if self.error_scope() == Some(ErrorScope::Validation) {
            self.error = None;
        }
    }

    pub fn submit_upload(&mut self) -> Option<Command> {
        match self.state {
            WorkflowState::Uploading => {
                self.reject("An upload is already in progress");
                return None;
            }
            WorkflowState::Idle | WorkflowState::FilesSelected => {}
            _ => {
                self.reject("Reset the current analysis before uploading new files");
                return None;
            }
        }
        if !self.slots.is_ready() {
            self.reject(MSG_MISSING_FILES);
            return None;
        }
        if !self.backend_healthy {
            self.error = Some(WorkflowError::connectivity(
                "Backend is not available; upload is disabled until the health check succeeds",
            ));
            return None;
        }

        let token = self.issue_token();
        self.pending_upload = Some(token);
        self.transition(WorkflowState::Uploading);
        info!("Uploading record ({} files)", self.slots.iter().count());
        Some(Command::Upload {
            token,
            slots: self.slots.clone(),
        })
    }

    pub fn select_beat(&mut self, index: i64) {
        if self.state != WorkflowState::BeatsAvailable {
            self.reject_beat_selection();
            return;
        }
        self.selection = Some(index);
        self.transition(WorkflowState::BeatsAvailable);
    }

    /// Free-text beat entry. Blank input clears the selection.
    pub fn select_beat_input(&mut self, input: &str) {
        if self.state != WorkflowState::BeatsAvailable {
            self.reject_beat_selection();
            return;
        }
        let trimmed = input.trim();
        if trimmed.is_empty() {
            self.selection = None;
            self.transition(WorkflowState::BeatsAvailable);
            return;
        }
        match trimmed.parse::<i64>() {
            Ok(index) => self.select_beat(index),
            Err(_) => {
                self.selection = None;
                self.reject(format!("'{}' is not a beat index", trimmed));
            }
        }
    }

    pub fn submit_analyze(&mut self) -> Option<Command> {
        match self.state {
            WorkflowState::BeatsAvailable => {}
            WorkflowState::Analyzing => {
                self.reject("An analysis is already in progress");
                return None;
            }
            WorkflowState::AnalysisComplete => {
                self.reject("Choose \"analyze another\" before analyzing a new beat");
                return None;
            }
            _ => {
                self.reject("Upload a record before analyzing a beat");
                return None;
            }
        }
        let Some(session) = self.session.as_ref() else {
            self.reject("Upload a record before analyzing a beat");
            return None;
        };
        let Some(selected) = self.selection else {
            self.reject(MSG_NO_SELECTION);
            return None;
        };
        let total = session.total_beats;
        if selected < 0 || selected as u64 >= total as u64 {
            self.reject(beat_range_message(total));
            return None;
        }

        let session_id = session.session_id.clone();
        let beat_index = selected as usize;
        let token = self.issue_token();
        self.pending_analyze = Some(token);
        self.transition(WorkflowState::Analyzing);
        info!("Analyzing beat {} of session {}", beat_index, session_id);
        Some(Command::Analyze {
            token,
            session_id,
            beat_index,
        })
    }

    pub fn analyze_another(&mut self) {
        if self.state != WorkflowState::AnalysisComplete {
            self.reject("There is no analysis result to move on from");
            return;
        }
        self.result = None;
        self.selection = None;
        self.transition(WorkflowState::BeatsAvailable);
    }

    /// Back to Idle, discarding everything. Returns the best-effort cleanup
    /// for the current session, if any. In-flight requests become stale.
    pub fn reset(&mut self) -> Option<Command> {
        let cleanup = self.session.take().map(|s| Command::Cleanup {
            session_id: s.session_id,
        });
        if self.pending_upload.is_some() || self.pending_analyze.is_some() {
            debug!("Reset with a request in flight; its response will be dropped");
        }
        self.pending_upload = None;
        self.pending_analyze = None;
        self.slots.clear();
        self.selection = None;
        self.result = None;
        self.error = None;
        self.state = WorkflowState::Idle;
        info!("Workflow reset");
        cleanup
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    // ─── Completions ────────────────────────────────────────────────────

    /// Apply a finished request. May return a follow-up command (cleanup of
    /// a session created by an upload that was abandoned).
    pub fn complete(&mut self, completion: Completion) -> Option<Command> {
        let token = completion.token;
        match completion.outcome {
            Outcome::Health(result) => {
                if self.pending_health != Some(token) {
                    debug!("Dropping stale health response (token {})", token);
                    return None;
                }
                self.pending_health = None;
                self.apply_health(result);
                None
            }

            Outcome::Upload(result) => {
                if self.pending_upload != Some(token) {
                    debug!("Dropping stale upload response (token {})", token);
                    // The server allocated a session nobody will use.
                    return result.ok().map(|r| Command::Cleanup {
                        session_id: r.session_id,
                    });
                }
                self.pending_upload = None;
                match result {
                    Ok(resp) => {
                        info!(
                            "Upload accepted: session {} with {} beats",
                            resp.session_id, resp.total_beats
                        );
                        self.session = Some(Session::from(resp));
                        self.slots.clear();
                        self.selection = None;
                        self.result = None;
                        self.transition(WorkflowState::BeatsAvailable);
                    }
                    Err(e) => {
                        warn!("Upload failed: {}", e);
                        self.state = WorkflowState::FilesSelected;
                        self.error = Some(WorkflowError::from(&e));
                    }
                }
                None
            }

            Outcome::Analyze(result) => {
                if self.pending_analyze != Some(token) {
                    debug!("Dropping stale analysis response (token {})", token);
                    return None;
                }
                self.pending_analyze = None;
                match result {
                    Ok(r) => {
                        info!("Analysis complete: {}", r);
                        self.result = Some(r);
                        self.transition(WorkflowState::AnalysisComplete);
                    }
                    Err(e) => {
                        warn!("Analysis failed: {}", e);
                        self.state = WorkflowState::BeatsAvailable;
                        self.error = Some(WorkflowError::from(&e));
                    }
                }
                None
            }

            Outcome::Cleanup { session_id, result } => {
                match result {
                    Ok(_) => debug!("Session {} cleaned up", session_id),
                    Err(e) => warn!("Cleanup of session {} failed: {}", session_id, e),
                }
                None
            }
        }
    }

    // ─── Internals ──────────────────────────────────────────────────────

    fn apply_health(&mut self, result: Result<HealthStatus, ServiceError>) {
        match result {
            Ok(h) => {
                self.backend_healthy = h.is_healthy();
                if !h.normal_reference_loaded {
                    self.error = Some(WorkflowError::connectivity(MSG_REFERENCE_NOT_LOADED));
                } else if !self.backend_healthy {
                    self.error = Some(WorkflowError::connectivity(format!(
                        "Backend reported status '{}'",
                        h.status
                    )));
                } else if self.error_scope() == Some(ErrorScope::Connectivity) {
                    self.error = None;
                }
                info!(
                    "Backend health: {} (reference loaded: {})",
                    h.status, h.normal_reference_loaded
                );
                self.health = Some(h);
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                self.backend_healthy = false;
                self.health = None;
                self.error = Some(WorkflowError::connectivity(MSG_BACKEND_DOWN));
            }
        }
    }

    fn error_scope(&self) -> Option<ErrorScope> {
        self.error.as_ref().map(|e| e.scope)
    }

    fn transition(&mut self, to: WorkflowState) {
        if self.state != to {
            debug!("{} → {}", self.state, to);
        }
        self.state = to;
        self.error = None;
    }

    fn reject(&mut self, message: impl Into<String>) {
        let err = WorkflowError::validation(message);
        debug!("Rejected in {}: {}", self.state, err);
        self.error = Some(err);
    }

    fn reject_beat_selection(&mut self) {
        match self.state {
            WorkflowState::Analyzing => self.reject("Wait for the current analysis to finish"),
            WorkflowState::AnalysisComplete => {
                self.reject("Choose \"analyze another\" before selecting a new beat")
            }
            _ => self.reject("Upload a record before selecting a beat"),
        }
    }

    fn issue_token(&mut self) -> Token {
        let t = self.next_token;
        self.next_token += 1;
        t
    }
}
