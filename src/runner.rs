use crate::presentation::{AnimationDriver, AnimationSpec, Navigator, Route, View};
use crate::service::AnalysisService;
use crate::types::{SlotKind, UploadFile};
use crate::upload_slots::UploadSlots;
use crate::workflow::*;
use crossbeam_channel::{select, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// User-side triggers fed into the runner.
#[derive(Debug, Clone)]
pub enum Action {
    SelectFile(SlotKind, UploadFile),
    SubmitUpload,
    SelectBeat(i64),
    SelectBeatInput(String),
    SubmitAnalyze,
    AnalyzeAnother,
    Reset,
    DismissError,
    RefreshHealth,
    Navigate(Route),
    /// A view scrolled into the viewport.
    ScrollInto(View),
}

// ─── Dispatcher ─────────────────────────────────────────────────────────────

/// Executes workflow commands against the backend on its own thread and
/// sends completions back. Exits when the command channel closes.
pub struct Dispatcher {
    service: Arc<dyn AnalysisService>,
    command_rx: Receiver<Command>,
    completion_tx: Sender<Completion>,
}

impl Dispatcher {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        command_rx: Receiver<Command>,
        completion_tx: Sender<Completion>,
    ) -> Self {
        Self {
            service,
            command_rx,
            completion_tx,
        }
    }

    pub fn run(&self) {
        let mut count: u64 = 0;
        for command in self.command_rx.iter() {
            let completion = execute(self.service.as_ref(), command);
            count += 1;
            if self.completion_tx.send(completion).is_err() {
                // Runner is gone; remaining commands are best-effort cleanups.
                debug!("Completion channel closed");
            }
        }
        info!("Dispatcher shutting down after {} requests", count);
    }
}

/// Run one command synchronously.
pub fn execute(service: &dyn AnalysisService, command: Command) -> Completion {
    match command {
        Command::HealthCheck { token } => Completion {
            token,
            outcome: Outcome::Health(service.health()),
        },
        Command::Upload { token, slots } => Completion {
            token,
            outcome: Outcome::Upload(service.upload(&slots)),
        },
        Command::Analyze {
            token,
            session_id,
            beat_index,
        } => Completion {
            token,
            outcome: Outcome::Analyze(service.analyze(&session_id, beat_index)),
        },
        Command::Cleanup { session_id } => {
            let result = service.cleanup(&session_id);
            Completion {
                token: 0,
                outcome: Outcome::Cleanup { session_id, result },
            }
        }
    }
}

// ─── Runner ─────────────────────────────────────────────────────────────────

/// Owns the [`Workflow`] and reacts to one event at a time: user actions
/// and network completions. Every step is followed by a [`Snapshot`] sent
/// to all observers.
pub struct WorkflowRunner {
    workflow: Workflow,
    action_rx: Receiver<Action>,
    completion_rx: Receiver<Completion>,
    command_tx: Sender<Command>,
    snapshot_txs: Vec<Sender<Snapshot>>,
    animation: Box<dyn AnimationDriver>,
    navigator: Box<dyn Navigator>,
    applied: u64,
}

impl WorkflowRunner {
    pub fn new(
        action_rx: Receiver<Action>,
        completion_rx: Receiver<Completion>,
        command_tx: Sender<Command>,
        snapshot_txs: Vec<Sender<Snapshot>>,
        animation: Box<dyn AnimationDriver>,
        navigator: Box<dyn Navigator>,
    ) -> Self {
        Self {
            workflow: Workflow::new(),
            action_rx,
            completion_rx,
            command_tx,
            snapshot_txs,
            animation,
            navigator,
            applied: 0,
        }
    }

    /// Blocks until the action channel closes.
    pub fn run(&mut self) {
        info!("Workflow runner started");
        let probe = self.workflow.start();
        self.dispatch(Some(probe));
        self.animation
            .on_mount(View::UploadSection, &AnimationSpec::UPLOAD_SECTION);
        self.publish();

        let action_rx = self.action_rx.clone();
        let completion_rx = self.completion_rx.clone();
        let mut steps: u64 = 0;
        loop {
            let before = self.workflow.state();
            select! {
                recv(action_rx) -> msg => match msg {
                    Ok(action) => {
                        self.apply(action);
                        self.applied += 1;
                    }
                    Err(_) => break,
                },
                recv(completion_rx) -> msg => match msg {
                    Ok(completion) => {
                        let follow_up = self.workflow.complete(completion);
                        self.dispatch(follow_up);
                    }
                    Err(_) => {
                        warn!("Dispatcher stopped; runner exiting");
                        break;
                    }
                },
            }
            self.animate_transition(before, self.workflow.state());
            self.publish();
            steps += 1;
        }

        info!("Workflow runner shutting down after {} steps", steps);
    }

    fn apply(&mut self, action: Action) {
        debug!("Action: {:?}", action);
        let command = match action {
            Action::SelectFile(kind, file) => {
                self.workflow.select_file(kind, file);
                None
            }
            Action::SubmitUpload => self.workflow.submit_upload(),
            Action::SelectBeat(index) => {
                self.workflow.select_beat(index);
                None
            }
            Action::SelectBeatInput(text) => {
                self.workflow.select_beat_input(&text);
                None
            }
            Action::SubmitAnalyze => self.workflow.submit_analyze(),
            Action::AnalyzeAnother => {
                self.workflow.analyze_another();
                None
            }
            Action::Reset => self.workflow.reset(),
            Action::DismissError => {
                self.workflow.dismiss_error();
                None
            }
            Action::RefreshHealth => Some(self.workflow.refresh_health()),
            Action::Navigate(route) => {
                self.navigator.navigate_to(route);
                None
            }
            Action::ScrollInto(view) => {
                self.animation
                    .on_scroll_into(view, AnimationSpec::for_view(view));
                None
            }
        };
        self.dispatch(command);
    }

    fn dispatch(&self, command: Option<Command>) {
        if let Some(cmd) = command {
            if self.command_tx.send(cmd).is_err() {
                warn!("Dispatcher channel closed; request dropped");
            }
        }
    }

    fn animate_transition(&mut self, from: WorkflowState, to: WorkflowState) {
        if from == to {
            return;
        }
        match to {
            WorkflowState::BeatsAvailable if from == WorkflowState::Uploading => {
                self.animation
                    .on_mount(View::BeatSelection, &AnimationSpec::BEAT_SELECTION);
            }
            WorkflowState::AnalysisComplete => {
                self.animation
                    .on_mount(View::Results, &AnimationSpec::RESULT_CARDS);
            }
            _ => {}
        }
    }

    fn publish(&mut self) {
        let mut snap = self.workflow.snapshot();
        snap.seq = self.applied;
        self.snapshot_txs
            .retain(|tx| tx.send(snap.clone()).is_ok());
    }
}

fn error_text(snap: &Snapshot, fallback: &str) -> String {
    snap.error
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| fallback.to_string())
}

// ─── Threaded handle ────────────────────────────────────────────────────────

/// Runner + dispatcher on background threads, driven through channels.
pub struct RunnerHandle {
    actions: Sender<Action>,
    snapshots: Receiver<Snapshot>,
    last: Option<Snapshot>,
    sent: u64,
    threads: Vec<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Spawn the pipeline. `observers` receive every snapshot in addition to
    /// the handle's own channel.
    pub fn spawn(
        service: Arc<dyn AnalysisService>,
        observers: Vec<Sender<Snapshot>>,
        animation: Box<dyn AnimationDriver>,
        navigator: Box<dyn Navigator>,
    ) -> std::io::Result<Self> {
        let (action_tx, action_rx) = unbounded::<Action>();
        let (command_tx, command_rx) = unbounded::<Command>();
        let (completion_tx, completion_rx) = unbounded::<Completion>();
        let (snap_tx, snap_rx) = unbounded::<Snapshot>();

        let mut snapshot_txs = vec![snap_tx];
        snapshot_txs.extend(observers);

        let mut threads = Vec::new();
        threads.push(thread::Builder::new().name("dispatcher".into()).spawn(move || {
            Dispatcher::new(service, command_rx, completion_tx).run();
        })?);
        threads.push(thread::Builder::new().name("workflow".into()).spawn(move || {
            WorkflowRunner::new(
                action_rx,
                completion_rx,
                command_tx,
                snapshot_txs,
                animation,
                navigator,
            )
            .run();
        })?);

        Ok(Self {
            actions: action_tx,
            snapshots: snap_rx,
            last: None,
            sent: 0,
            threads,
        })
    }

    pub fn send(&mut self, action: Action) {
        if self.actions.send(action).is_err() {
            warn!("Workflow runner is gone; action dropped");
            return;
        }
        self.sent += 1;
    }

    /// Consume snapshots until one satisfies `pred`, or the timeout expires.
    pub fn wait_for<F>(&mut self, timeout: Duration, pred: F) -> Option<Snapshot>
    where
        F: Fn(&Snapshot) -> bool,
    {
        if let Some(s) = self.last.as_ref() {
            if pred(s) {
                return Some(s.clone());
            }
        }
        let deadline = Instant::now() + timeout;
        loop {
            let snap = self.next_snapshot(deadline)?;
            if pred(&snap) {
                return Some(snap);
            }
        }
    }

    /// Send an action and wait until the runner has applied it (and every
    /// action before it) and the workflow is no longer busy.
    pub fn send_and_settle(&mut self, action: Action, timeout: Duration) -> Option<Snapshot> {
        self.send(action);
        let target = self.sent;
        let deadline = Instant::now() + timeout;
        loop {
            let snap = self.next_snapshot(deadline)?;
            if snap.seq >= target && !snap.state.is_busy() {
                return Some(snap);
            }
        }
    }

    /// Upload `slots` and analyze `beat` in one pass. Returns the completed
    /// snapshot. Every path past the upload request ends with a reset, so
    /// the server session is cleaned up on failure and timeout too, unless
    /// `keep_session` is set.
    pub fn analyze_record(
        &mut self,
        slots: &UploadSlots,
        beat: i64,
        keep_session: bool,
        wait: Duration,
    ) -> Result<Snapshot, String> {
        let health = self
            .wait_for(wait, |s| s.backend_healthy || s.error.is_some())
            .ok_or("Timed out waiting for the health check")?;
        if !health.backend_healthy {
            return Err(error_text(&health, "Backend is not available"));
        }

        self.send(Action::Navigate(Route::Analysis));
        for (kind, file) in slots.iter() {
            info!("  {} ← {} ({} bytes)", kind, file.name, file.bytes.len());
            self.send(Action::SelectFile(kind, file.clone()));
        }

        let outcome = self.upload_and_analyze(beat, wait);
        if keep_session {
            if let Some(id) = self.last.as_ref().and_then(|s| s.session_id.as_ref()) {
                info!("Keeping session {}", id);
            }
        } else if self.send_and_settle(Action::Reset, wait).is_none() {
            warn!("Timed out waiting for the reset");
        }
        outcome
    }

    fn upload_and_analyze(&mut self, beat: i64, wait: Duration) -> Result<Snapshot, String> {
        let snap = self
            .send_and_settle(Action::SubmitUpload, wait)
            .ok_or("Timed out waiting for the upload")?;
        if snap.state != WorkflowState::BeatsAvailable {
            return Err(error_text(&snap, "Upload failed"));
        }
        info!(
            "Session {}: {} beats ({} previews)",
            snap.session_id.as_deref().unwrap_or("?"),
            snap.total_beats,
            snap.preview_count
        );

        self.send(Action::SelectBeat(beat));
        let snap = self
            .send_and_settle(Action::SubmitAnalyze, wait)
            .ok_or("Timed out waiting for the analysis")?;
        match (&snap.state, &snap.result) {
            (WorkflowState::AnalysisComplete, Some(_)) => Ok(snap),
            _ => Err(error_text(&snap, "Analysis failed")),
        }
    }

    fn next_snapshot(&mut self, deadline: Instant) -> Option<Snapshot> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.snapshots.recv_timeout(remaining) {
            Ok(snap) => {
                self.last = Some(snap.clone());
                Some(snap)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Close the action channel and wait for both threads. Pending cleanup
    /// requests are still executed.
    pub fn shutdown(self) {
        let RunnerHandle {
            actions, threads, ..
        } = self;
        drop(actions);
        for h in threads {
            let _ = h.join();
        }
    }
}
