//! End-to-end integration tests for the ECG workflow.
//!
//! These tests exercise the full flow:
//!   Action channel → WorkflowRunner → Dispatcher → AnalysisService → Snapshot channel
//!
//! The runner tests use a scripted in-process service. The HTTP tests run
//! the real client against a one-shot TCP stub that serves canned JSON.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ecg_workflow::error::{ErrorScope, ServiceError};
use ecg_workflow::presentation::{LogNavigator, NoAnimation, Route};
use ecg_workflow::runner::{Action, RunnerHandle};
use ecg_workflow::service::{AnalysisService, ClientConfig, HttpAnalysisService};
use ecg_workflow::types::*;
use ecg_workflow::upload_slots::UploadSlots;
use ecg_workflow::workflow::*;

const WAIT: Duration = Duration::from_secs(5);

// ─── Helpers ───────────────────────────────────────────────────────────────

fn healthy() -> HealthStatus {
    HealthStatus {
        status: "healthy".into(),
        normal_reference_loaded: true,
        classification_mode: Some("binary_normal_vs_abnormal".into()),
        threshold: Some(10.0),
        active_sessions: Some(0),
    }
}

fn upload_response(session_id: &str, total_beats: usize) -> UploadResponse {
    UploadResponse {
        session_id: session_id.into(),
        total_beats,
        beat_previews: (0..total_beats.min(50))
            .map(|i| BeatPreview {
                index: i,
                label: Some("N".into()),
                signal: vec![0.0, 0.5, 1.0, 0.2],
            })
            .collect(),
        sampling_rate: Some(360),
        message: Some("Upload successful".into()),
    }
}

fn analysis(beat_index: usize, class: PredictedClass, dtw: f64) -> AnalysisResult {
    AnalysisResult {
        beat_index,
        actual_label: "V".into(),
        predicted_class: class,
        dtw_distance: dtw,
        plots: Plots {
            overlay: "data:image/png;base64,iVBORw0KGgo=".into(),
            alignment: "data:image/png;base64,iVBORw0KGgo=".into(),
            heatmap: "data:image/png;base64,iVBORw0KGgo=".into(),
        },
        threshold: Some(10.0),
        patient_signal: vec![0.0, 0.3, 1.2, -0.4, 0.1],
        normal_reference: vec![0.0, 0.2, 1.0, -0.2, 0.0],
        classification: None,
    }
}

fn record_files() -> Vec<(SlotKind, UploadFile)> {
    SlotKind::ALL
        .into_iter()
        .map(|k| (k, UploadFile::new(format!("100{}", k.extension()), vec![1, 2, 3])))
        .collect()
}

/// Scripted backend. Every call is logged; upload/analyze can be held on a
/// gate until the test releases them.
struct MockService {
    health: Result<HealthStatus, ServiceError>,
    upload: Result<UploadResponse, ServiceError>,
    analyze: Result<AnalysisResult, ServiceError>,
    upload_gate: Option<Receiver<()>>,
    analyze_gate: Option<Receiver<()>>,
    calls: Mutex<Vec<String>>,
}

impl MockService {
    fn new() -> Self {
        Self {
            health: Ok(healthy()),
            upload: Ok(upload_response("s1", 3)),
            analyze: Ok(analysis(1, PredictedClass::Abnormal, 12.34)),
            upload_gate: None,
            analyze_gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl AnalysisService for MockService {
    fn upload(&self, slots: &UploadSlots) -> Result<UploadResponse, ServiceError> {
        self.log(format!("upload:{}", slots.iter().count()));
        if let Some(gate) = &self.upload_gate {
            let _ = gate.recv();
        }
        self.upload.clone()
    }

    fn analyze(&self, session_id: &str, beat_index: usize) -> Result<AnalysisResult, ServiceError> {
        self.log(format!("analyze:{}:{}", session_id, beat_index));
        if let Some(gate) = &self.analyze_gate {
            let _ = gate.recv();
        }
        self.analyze.clone()
    }

    fn get_beat(&self, session_id: &str, beat_index: usize) -> Result<BeatData, ServiceError> {
        self.log(format!("get_beat:{}:{}", session_id, beat_index));
        Ok(BeatData {
            beat_index,
            label: Some("N".into()),
            signal: vec![0.0; 4],
        })
    }

    fn cleanup(&self, session_id: &str) -> Result<CleanupReceipt, ServiceError> {
        self.log(format!("cleanup:{}", session_id));
        Ok(CleanupReceipt {
            message: Some(format!("Session {} cleaned up", session_id)),
        })
    }

    fn health(&self) -> Result<HealthStatus, ServiceError> {
        self.log("health".into());
        self.health.clone()
    }
}

/// Start a runner over `mock`, plus an observer channel that sees every snapshot.
fn start(mock: Arc<MockService>) -> (RunnerHandle, Receiver<Snapshot>) {
    let (obs_tx, obs_rx) = unbounded::<Snapshot>();
    let handle = RunnerHandle::spawn(
        mock,
        vec![obs_tx],
        Box::new(NoAnimation),
        Box::new(LogNavigator::new()),
    )
    .unwrap();
    (handle, obs_rx)
}

fn wait_healthy(handle: &mut RunnerHandle) -> Snapshot {
    handle
        .wait_for(WAIT, |s| s.backend_healthy || s.error.is_some())
        .expect("health probe never completed")
}

fn select_all_files(handle: &mut RunnerHandle) {
    for (kind, file) in record_files() {
        handle.send(Action::SelectFile(kind, file));
    }
}

fn record_slots() -> UploadSlots {
    let mut slots = UploadSlots::new();
    for (kind, file) in record_files() {
        slots.set_slot(kind, file);
    }
    slots
}

fn cleaned(mock: &MockService, session_id: &str) -> bool {
    let want = format!("cleanup:{}", session_id);
    mock.calls().iter().any(|c| *c == want)
}

fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

// ─── Runner Tests ──────────────────────────────────────────────────────────

#[test]
fn test_full_session_upload_analyze_another() {
    let mock = Arc::new(MockService::new());
    let (mut handle, _obs) = start(mock.clone());

    let snap = wait_healthy(&mut handle);
    assert!(snap.backend_healthy);
    assert!(snap.error.is_none());

    handle.send(Action::Navigate(Route::Analysis));
    select_all_files(&mut handle);
    let snap = handle.send_and_settle(Action::SubmitUpload, WAIT).unwrap();
    assert_eq!(snap.state, WorkflowState::BeatsAvailable);
    assert_eq!(snap.session_id.as_deref(), Some("s1"));
    assert_eq!(snap.total_beats, 3);
    assert_eq!(snap.preview_count, 3);
    assert!(snap.missing_slots.len() == 4, "slots cleared after upload");

    handle.send(Action::SelectBeat(1));
    let snap = handle.send_and_settle(Action::SubmitAnalyze, WAIT).unwrap();
    assert_eq!(snap.state, WorkflowState::AnalysisComplete);
    let result = snap.result.as_ref().unwrap();
    assert_eq!(result.predicted_class, PredictedClass::Abnormal);
    assert!((result.dtw_distance - 12.34).abs() < 1e-9);
    assert!(snap.actions.analyze_another);
    assert!(!snap.actions.select_beat);

    let snap = handle.send_and_settle(Action::AnalyzeAnother, WAIT).unwrap();
    assert_eq!(snap.state, WorkflowState::BeatsAvailable);
    assert_eq!(snap.selection, None);
    assert!(snap.result.is_none());
    assert_eq!(snap.session_id.as_deref(), Some("s1"));

    let snap = handle.send_and_settle(Action::Reset, WAIT).unwrap();
    assert_eq!(snap.state, WorkflowState::Idle);
    assert!(snap.session_id.is_none());
    handle.shutdown();

    assert_eq!(
        mock.calls(),
        vec!["health", "upload:4", "analyze:s1:1", "cleanup:s1"]
    );
}

#[test]
fn test_reset_during_analysis_drops_late_result() {
    let (release_tx, release_rx) = bounded::<()>(1);
    let mut mock = MockService::new();
    mock.analyze_gate = Some(release_rx);
    let mock = Arc::new(mock);
    let (mut handle, obs) = start(mock.clone());

    wait_healthy(&mut handle);
    select_all_files(&mut handle);
    handle.send_and_settle(Action::SubmitUpload, WAIT).unwrap();
    handle.send(Action::SelectBeat(2));
    handle.send(Action::SubmitAnalyze);
    handle
        .wait_for(WAIT, |s| s.state == WorkflowState::Analyzing)
        .expect("never started analyzing");

    let snap = handle.send_and_settle(Action::Reset, WAIT).unwrap();
    assert_eq!(snap.state, WorkflowState::Idle);

    // Let the analysis finish; the dispatcher then runs the queued cleanup.
    release_tx.send(()).unwrap();
    assert!(wait_until(|| mock.calls().iter().any(|c| c == "cleanup:s1")));
    // One more round-trip so the late completion has been applied.
    handle.send_and_settle(Action::DismissError, WAIT).unwrap();
    handle.shutdown();

    let snaps: Vec<Snapshot> = obs.try_iter().collect();
    let reset_at = snaps
        .iter()
        .position(|s| s.state == WorkflowState::Idle && s.seq > 0)
        .unwrap();
    for s in &snaps[reset_at..] {
        assert_eq!(s.state, WorkflowState::Idle, "late result leaked: {:?}", s.state);
        assert!(s.result.is_none());
        assert!(s.error.is_none());
    }
}

#[test]
fn test_stale_upload_session_is_cleaned_up() {
    let (release_tx, release_rx) = bounded::<()>(1);
    let mut mock = MockService::new();
    mock.upload = Ok(upload_response("orphan", 7));
    mock.upload_gate = Some(release_rx);
    let mock = Arc::new(mock);
    let (mut handle, _obs) = start(mock.clone());

    wait_healthy(&mut handle);
    select_all_files(&mut handle);
    handle.send(Action::SubmitUpload);
    handle
        .wait_for(WAIT, |s| s.state == WorkflowState::Uploading)
        .expect("never started uploading");

    let snap = handle.send_and_settle(Action::Reset, WAIT).unwrap();
    assert_eq!(snap.state, WorkflowState::Idle);
    assert!(snap.session_id.is_none());

    release_tx.send(()).unwrap();
    assert!(wait_until(|| mock.calls().iter().any(|c| c == "cleanup:orphan")));

    let snap = handle.send_and_settle(Action::DismissError, WAIT).unwrap();
    assert_eq!(snap.state, WorkflowState::Idle);
    assert!(snap.session_id.is_none());
    handle.shutdown();
}

#[test]
fn test_reference_not_loaded_blocks_upload() {
    let mut mock = MockService::new();
    mock.health = Ok(HealthStatus {
        normal_reference_loaded: false,
        ..healthy()
    });
    let mock = Arc::new(mock);
    let (mut handle, _obs) = start(mock.clone());

    let snap = wait_healthy(&mut handle);
    assert!(!snap.backend_healthy);
    assert_eq!(snap.error.as_ref().unwrap().message, MSG_REFERENCE_NOT_LOADED);

    select_all_files(&mut handle);
    let snap = handle.send_and_settle(Action::SubmitUpload, WAIT).unwrap();
    assert_eq!(snap.state, WorkflowState::FilesSelected);
    assert!(!snap.actions.upload);
    assert_eq!(snap.error.as_ref().unwrap().scope, ErrorScope::Connectivity);
    handle.shutdown();

    assert_eq!(mock.calls(), vec!["health"]);
}

#[test]
fn test_backend_down_then_refresh() {
    let mut mock = MockService::new();
    mock.health = Err(ServiceError::Connectivity("connection refused".into()));
    let mock = Arc::new(mock);
    let (mut handle, _obs) = start(mock.clone());

    let snap = wait_healthy(&mut handle);
    assert!(!snap.backend_healthy);
    assert_eq!(snap.error.as_ref().unwrap().message, MSG_BACKEND_DOWN);

    // No automatic re-polling: the only further probe is the explicit one.
    let snap = handle.send_and_settle(Action::RefreshHealth, WAIT).unwrap();
    assert!(snap.seq >= 1);
    assert!(wait_until(|| mock.calls().len() == 2));
    handle.shutdown();
    assert_eq!(mock.calls(), vec!["health", "health"]);
}

#[test]
fn test_upload_rejection_keeps_files() {
    let mut mock = MockService::new();
    mock.upload = Err(ServiceError::Rejected {
        status: 400,
        message: "Missing files. Required: ['atr', 'dat', 'hea', 'xws']".into(),
    });
    let mock = Arc::new(mock);
    let (mut handle, _obs) = start(mock.clone());

    wait_healthy(&mut handle);
    select_all_files(&mut handle);
    let snap = handle.send_and_settle(Action::SubmitUpload, WAIT).unwrap();
    assert_eq!(snap.state, WorkflowState::FilesSelected);
    assert!(snap.missing_slots.is_empty());
    let err = snap.error.unwrap();
    assert_eq!(err.scope, ErrorScope::ServerRejection);
    assert!(err.message.starts_with("Missing files."));
    assert!(snap.actions.upload, "retry allowed");
    handle.shutdown();
}

#[test]
fn test_out_of_range_beat_never_hits_backend() {
    let mock = Arc::new(MockService::new());
    let (mut handle, _obs) = start(mock.clone());

    wait_healthy(&mut handle);
    select_all_files(&mut handle);
    handle.send_and_settle(Action::SubmitUpload, WAIT).unwrap();

    handle.send(Action::SelectBeatInput("5".into()));
    let snap = handle.send_and_settle(Action::SubmitAnalyze, WAIT).unwrap();
    assert_eq!(snap.state, WorkflowState::BeatsAvailable);
    assert_eq!(
        snap.error.as_ref().unwrap().message,
        "Beat index must be between 0 and 2"
    );

    let snap = handle.send_and_settle(Action::SubmitAnalyze, WAIT).unwrap();
    assert_eq!(snap.selection, Some(5));

    let snap = handle
        .send_and_settle(Action::SelectBeatInput(" ".into()), WAIT)
        .unwrap();
    assert_eq!(snap.selection, None);
    let snap = handle.send_and_settle(Action::SubmitAnalyze, WAIT).unwrap();
    assert_eq!(snap.error.as_ref().unwrap().message, MSG_NO_SELECTION);
    handle.shutdown();

    assert!(!mock.calls().iter().any(|c| c.starts_with("analyze")));
}

// ─── One-pass Record Tests ─────────────────────────────────────────────────

#[test]
fn test_analyze_record_cleans_up_after_success() {
    let mock = Arc::new(MockService::new());
    let (mut handle, _obs) = start(mock.clone());

    let snap = handle.analyze_record(&record_slots(), 1, false, WAIT).unwrap();
    assert_eq!(snap.state, WorkflowState::AnalysisComplete);
    assert_eq!(snap.session_id.as_deref(), Some("s1"));
    assert_eq!(snap.result.as_ref().unwrap().dtw_distance, 12.34);
    handle.shutdown();

    let calls = mock.calls();
    assert!(calls.contains(&"upload:4".to_string()));
    assert!(calls.contains(&"analyze:s1:1".to_string()));
    assert_eq!(calls.last().map(String::as_str), Some("cleanup:s1"));
}

#[test]
fn test_analyze_record_keeps_session_on_request() {
    let mock = Arc::new(MockService::new());
    let (mut handle, _obs) = start(mock.clone());

    handle.analyze_record(&record_slots(), 0, true, WAIT).unwrap();
    handle.shutdown();
    assert!(!mock.calls().iter().any(|c| c.starts_with("cleanup")));
}

#[test]
fn test_analysis_timeout_still_cleans_up_session() {
    let (release_tx, release_rx) = bounded::<()>(1);
    let mut mock = MockService::new();
    mock.analyze_gate = Some(release_rx);
    let mock = Arc::new(mock);
    let (mut handle, obs) = start(mock.clone());

    let err = handle
        .analyze_record(&record_slots(), 2, false, Duration::from_millis(300))
        .unwrap_err();
    assert_eq!(err, "Timed out waiting for the analysis");

    // The cleanup is queued behind the stuck analysis
    release_tx.send(()).unwrap();
    assert!(wait_until(|| cleaned(&mock, "s1")));
    handle.shutdown();

    let last = obs.try_iter().last().unwrap();
    assert_eq!(last.state, WorkflowState::Idle);
    assert!(last.result.is_none());
}

#[test]
fn test_upload_timeout_still_cleans_up_session() {
    let (release_tx, release_rx) = bounded::<()>(1);
    let mut mock = MockService::new();
    mock.upload = Ok(upload_response("late", 4));
    mock.upload_gate = Some(release_rx);
    let mock = Arc::new(mock);
    let (mut handle, _obs) = start(mock.clone());

    let err = handle
        .analyze_record(&record_slots(), 0, false, Duration::from_millis(300))
        .unwrap_err();
    assert_eq!(err, "Timed out waiting for the upload");

    release_tx.send(()).unwrap();
    assert!(wait_until(|| cleaned(&mock, "late")));
    handle.shutdown();
    assert!(!mock.calls().iter().any(|c| c.starts_with("analyze")));
}

#[test]
fn test_rejected_beat_still_cleans_up_session() {
    let mock = Arc::new(MockService::new());
    let (mut handle, _obs) = start(mock.clone());

    let err = handle
        .analyze_record(&record_slots(), -1, false, WAIT)
        .unwrap_err();
    assert!(err.contains("between 0 and 2"), "{}", err);
    handle.shutdown();

    assert!(cleaned(&mock, "s1"));
    assert!(!mock.calls().iter().any(|c| c.starts_with("analyze")));
}

#[test]
fn test_analyze_record_reports_unhealthy_backend() {
    let mut mock = MockService::new();
    mock.health = Err(ServiceError::Connectivity("connection refused".into()));
    let mock = Arc::new(mock);
    let (mut handle, _obs) = start(mock.clone());

    assert!(handle
        .analyze_record(&record_slots(), 0, false, WAIT)
        .is_err());
    handle.shutdown();
    assert_eq!(mock.calls(), vec!["health".to_string()]);
}

// ─── HTTP Client Tests ─────────────────────────────────────────────────────

/// One request as seen by the stub.
struct Recorded {
    method: String,
    path: String,
    headers: Vec<String>,
    body: Vec<u8>,
}

/// Serve `responses` in order, one connection each, then stop.
/// Returns the base URL and a channel of recorded requests.
fn stub_server(responses: Vec<(u16, &'static str)>) -> (String, Receiver<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = unbounded::<Recorded>();
    thread::Builder::new()
        .name("stub-http".into())
        .spawn(move || {
            for (status, body) in responses {
                let (stream, _) = match listener.accept() {
                    Ok(s) => s,
                    Err(_) => return,
                };
                serve_one(stream, status, body, &tx);
            }
        })
        .unwrap();
    (format!("http://{}", addr), rx)
}

fn serve_one(stream: std::net::TcpStream, status: u16, body: &str, tx: &Sender<Recorded>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end().to_string();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap();
            }
        }
        headers.push(line);
    }
    let mut req_body = vec![0u8; content_length];
    reader.read_exact(&mut req_body).unwrap();

    let mut stream = stream;
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        if status < 400 { "OK" } else { "Error" },
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).unwrap();
    let _ = stream.flush();

    let _ = tx.send(Recorded {
        method,
        path,
        headers,
        body: req_body,
    });
}

fn client(base_url: String) -> HttpAnalysisService {
    HttpAnalysisService::new(&ClientConfig {
        base_url,
        timeout: Duration::from_secs(5),
    })
}

fn full_slots() -> UploadSlots {
    let mut slots = UploadSlots::new();
    for (kind, file) in record_files() {
        slots.set_slot(kind, file);
    }
    slots
}

#[test]
fn test_http_upload_sends_multipart() {
    let (url, rx) = stub_server(vec![(
        200,
        r#"{"session_id":"abc","total_beats":2,"sampling_rate":360,"message":"ok",
            "beat_previews":[{"index":0,"label":"N","signal":[0.1,0.2]},{"index":1,"label":"V","signal":[]}]}"#,
    )]);
    let resp = client(url).upload(&full_slots()).unwrap();
    assert_eq!(resp.session_id, "abc");
    assert_eq!(resp.total_beats, 2);
    assert_eq!(resp.beat_previews[1].label.as_deref(), Some("V"));
    assert_eq!(resp.sampling_rate, Some(360));

    let req = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(req.method, "POST");
    assert_eq!(req.path, "/upload");
    assert!(req
        .headers
        .iter()
        .any(|h| h.to_ascii_lowercase().starts_with("content-type: multipart/form-data; boundary=")));
    let body = String::from_utf8_lossy(&req.body);
    for part in ["atr", "dat", "hea", "xws"] {
        assert!(
            body.contains(&format!("name=\"{}\"; filename=\"100.{}\"", part, part)),
            "missing part {}",
            part
        );
    }
}

#[test]
fn test_http_analyze_path_and_decode() {
    let (url, rx) = stub_server(vec![(
        200,
        r#"{"beat_index":2,"actual_label":"V","predicted_class":"Abnormal","dtw_distance":12.34,
            "threshold":10.0,"patient_signal":[0.0,1.0],"normal_reference":[0.0,0.9],
            "classification":{"is_normal":false,"distance_to_threshold":2.34,"confidence":23.4},
            "plots":{"overlay":"data:image/png;base64,AA==","alignment":"data:image/png;base64,AA==","heatmap":"data:image/png;base64,AA=="}}"#,
    )]);
    let result = client(url).analyze("s1", 2).unwrap();
    assert_eq!(result.predicted_class, PredictedClass::Abnormal);
    assert_eq!(result.threshold, Some(10.0));
    assert!(!result.classification.unwrap().is_normal);

    let req = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/analyze/s1/2");
}

#[test]
fn test_http_rejection_uses_server_message() {
    let (url, _rx) = stub_server(vec![(400, r#"{"error":"Invalid beat index"}"#)]);
    let err = client(url).analyze("s1", 99).unwrap_err();
    assert_eq!(
        err,
        ServiceError::Rejected {
            status: 400,
            message: "Invalid beat index".into()
        }
    );
    assert_eq!(err.scope(), ErrorScope::ServerRejection);
}

#[test]
fn test_http_rejection_without_body_uses_fallback() {
    let (url, _rx) = stub_server(vec![(500, "internal"), (404, "{}")]);
    let svc = client(url);
    match svc.analyze("s1", 0).unwrap_err() {
        ServiceError::Rejected { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "Analysis failed");
        }
        other => panic!("unexpected {:?}", other),
    }
    match svc.get_beat("s1", 0).unwrap_err() {
        ServiceError::Rejected { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Failed to get beat");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_http_cleanup_and_get_beat() {
    let (url, rx) = stub_server(vec![
        (200, r#"{"beat_index":4,"label":"N","signal":[0.5,0.25]}"#),
        (200, r#"{"message":"Session s1 cleaned up"}"#),
    ]);
    let svc = client(url);
    let beat = svc.get_beat("s1", 4).unwrap();
    assert_eq!(beat.signal, vec![0.5, 0.25]);
    let receipt = svc.cleanup("s1").unwrap();
    assert_eq!(receipt.message.as_deref(), Some("Session s1 cleaned up"));

    let first = rx.recv_timeout(WAIT).unwrap();
    assert_eq!((first.method.as_str(), first.path.as_str()), ("GET", "/get_beat/s1/4"));
    let second = rx.recv_timeout(WAIT).unwrap();
    assert_eq!((second.method.as_str(), second.path.as_str()), ("DELETE", "/cleanup/s1"));
}

#[test]
fn test_http_health_statuses() {
    let (url, _rx) = stub_server(vec![
        (
            200,
            r#"{"status":"healthy","classification_mode":"binary_normal_vs_abnormal","threshold":10.0,"normal_reference_loaded":true,"active_sessions":1}"#,
        ),
        (503, r#"{"status":"down"}"#),
    ]);
    let svc = client(url);
    let h = svc.health().unwrap();
    assert!(h.is_healthy());
    assert_eq!(h.active_sessions, Some(1));

    let err = svc.health().unwrap_err();
    assert_eq!(err.user_message(), "Backend is not available");
}

#[test]
fn test_http_decode_error() {
    let (url, _rx) = stub_server(vec![(200, r#"{"unexpected":true}"#)]);
    // Unknown fields are ignored and the message is optional.
    let receipt = client(url).cleanup("s1").unwrap();
    assert_eq!(receipt.message, None);

    let (url, _rx) = stub_server(vec![(200, "not json")]);
    let err = client(url).health().unwrap_err();
    assert!(matches!(err, ServiceError::Decode(_)));
}

#[test]
fn test_http_connectivity_failure() {
    // Bind then drop to get a port nobody listens on.
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let err = client(format!("http://127.0.0.1:{}", port)).health().unwrap_err();
    assert!(matches!(err, ServiceError::Connectivity(_)));
    assert_eq!(err.scope(), ErrorScope::Connectivity);
}
