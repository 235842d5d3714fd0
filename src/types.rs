use serde::Deserialize;
use std::fmt;

// ─── Upload slots ───────────────────────────────────────────────────────────

/// The four files that make up one MIT-BIH style record.
/// Each slot maps to a fixed multipart part name and file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// `.atr`: beat annotations (R-peak positions + labels)
    Annotation,
    /// `.dat`: binary signal samples
    Signal,
    /// `.hea`: record header
    Header,
    /// `.xws`: additional waveform data
    Waveform,
}

impl SlotKind {
    pub const ALL: [SlotKind; 4] = [
        SlotKind::Annotation,
        SlotKind::Signal,
        SlotKind::Header,
        SlotKind::Waveform,
    ];

    /// Multipart part name expected by `/upload`. Also the file extension.
    pub fn part_name(self) -> &'static str {
        match self {
            SlotKind::Annotation => "atr",
            SlotKind::Signal => "dat",
            SlotKind::Header => "hea",
            SlotKind::Waveform => "xws",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SlotKind::Annotation => ".atr",
            SlotKind::Signal => ".dat",
            SlotKind::Header => ".hea",
            SlotKind::Waveform => ".xws",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SlotKind::Annotation => "Annotation file with beat labels",
            SlotKind::Signal => "Binary ECG signal data",
            SlotKind::Header => "Header file with metadata",
            SlotKind::Waveform => "Additional waveform data",
        }
    }

    pub fn from_part_name(name: &str) -> Option<SlotKind> {
        SlotKind::ALL.into_iter().find(|k| k.part_name() == name)
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A selected file: original name plus its bytes.
#[derive(Clone, PartialEq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

// ─── Backend responses ──────────────────────────────────────────────────────

/// Lightweight summary of one beat, returned with the upload response.
/// The backend only previews the first 50 beats.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BeatPreview {
    pub index: usize,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub signal: Vec<f64>,
}

/// `POST /upload` success body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadResponse {
    pub session_id: String,
    pub total_beats: usize,
    #[serde(default)]
    pub beat_previews: Vec<BeatPreview>,
    #[serde(default)]
    pub sampling_rate: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Server-side handle for uploaded data and its beat segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub total_beats: usize,
    pub beat_previews: Vec<BeatPreview>,
    pub sampling_rate: Option<u32>,
}

impl From<UploadResponse> for Session {
    fn from(r: UploadResponse) -> Self {
        Self {
            session_id: r.session_id,
            total_beats: r.total_beats,
            beat_previews: r.beat_previews,
            sampling_rate: r.sampling_rate,
        }
    }
}

/// Binary classification outcome.
/// Decoded from plain strings ("Normal", "Abnormal") as the backend sends them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PredictedClass {
    Normal,
    Abnormal,
}

impl PredictedClass {
    pub fn verdict(self) -> &'static str {
        match self {
            PredictedClass::Normal => "This heartbeat appears normal",
            PredictedClass::Abnormal => "This heartbeat shows abnormalities",
        }
    }
}

impl fmt::Display for PredictedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictedClass::Normal => f.write_str("Normal"),
            PredictedClass::Abnormal => f.write_str("Abnormal"),
        }
    }
}

/// Rendered comparison images. Each is a `data:image/png;base64,...` URI;
/// see [`crate::plots::PlotImage`] for decoding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Plots {
    pub overlay: String,
    pub alignment: String,
    pub heatmap: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassificationDetail {
    pub is_normal: bool,
    pub distance_to_threshold: f64,
    /// Percent distance from the threshold, relative to the threshold.
    pub confidence: f64,
}

/// `GET /analyze/{session}/{beat}` success body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisResult {
    pub beat_index: usize,
    pub actual_label: String,
    pub predicted_class: PredictedClass,
    pub dtw_distance: f64,
    pub plots: Plots,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub patient_signal: Vec<f64>,
    #[serde(default)]
    pub normal_reference: Vec<f64>,
    #[serde(default)]
    pub classification: Option<ClassificationDetail>,
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "beat={} label={} class={} dtw={:.4}",
            self.beat_index, self.actual_label, self.predicted_class, self.dtw_distance
        )?;
        if let Some(t) = self.threshold {
            write!(f, " threshold={:.4}", t)?;
        }
        Ok(())
    }
}

/// `GET /get_beat/{session}/{beat}` success body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BeatData {
    pub beat_index: usize,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub signal: Vec<f64>,
}

/// `DELETE /cleanup/{session}` success body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CleanupReceipt {
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /health` body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub normal_reference_loaded: bool,
    #[serde(default)]
    pub classification_mode: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub active_sessions: Option<u32>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.normal_reference_loaded
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_body_with_optional_fields_missing() {
        let body = r#"{
            "beat_index": 3,
            "actual_label": "V",
            "predicted_class": "Abnormal",
            "dtw_distance": 14.5,
            "plots": {"overlay": "a", "alignment": "b", "heatmap": "c"},
            "extra_field_from_newer_backend": 1
        }"#;
        let r: AnalysisResult = serde_json::from_str(body).unwrap();
        assert_eq!(r.predicted_class, PredictedClass::Abnormal);
        assert_eq!(r.threshold, None);
        assert!(r.patient_signal.is_empty());
        assert!(r.classification.is_none());
        assert_eq!(r.to_string(), "beat=3 label=V class=Abnormal dtw=14.5000");
    }

    #[test]
    fn test_unknown_class_is_rejected() {
        let body = r#"{"beat_index":0,"actual_label":"N","predicted_class":"Maybe",
            "dtw_distance":1.0,"plots":{"overlay":"","alignment":"","heatmap":""}}"#;
        assert!(serde_json::from_str::<AnalysisResult>(body).is_err());
    }

    #[test]
    fn test_health_requires_reference() {
        let h: HealthStatus = serde_json::from_str(r#"{"status":"healthy"}"#).unwrap();
        assert!(!h.normal_reference_loaded);
        assert!(!h.is_healthy());
        let h: HealthStatus =
            serde_json::from_str(r#"{"status":"healthy","normal_reference_loaded":true}"#).unwrap();
        assert!(h.is_healthy());
    }
}
