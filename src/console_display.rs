use crate::types::SlotKind;
use crate::workflow::Snapshot;
use crossbeam_channel::Receiver;
use log::debug;
use std::io::{self, Write};

const INNER: usize = 58;

/// Renders a boxed status panel every time the workflow publishes a snapshot.
pub struct ConsoleDisplay {
    rx: Receiver<Snapshot>,
    clear_screen: bool,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<Snapshot>) -> Self {
        Self {
            rx,
            clear_screen: true,
        }
    }

    /// Append panels instead of redrawing in place (for piped output).
    pub fn scrolling(mut self) -> Self {
        self.clear_screen = false;
        self
    }

    pub fn run(&self) {
        let mut stdout = io::stdout();
        if let Err(e) = self.run_to(&mut stdout) {
            debug!("Console display stopped: {}", e);
        }
    }

    /// Draw a panel for each distinct snapshot until the channel closes.
    pub fn run_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut last: Option<Snapshot> = None;
        for snap in self.rx.iter() {
            if last.as_ref() == Some(&snap) {
                continue;
            }
            if self.clear_screen {
                // Clear screen and move cursor home
                write!(out, "\x1b[2J\x1b[H")?;
            }
            write!(out, "{}", render_panel(&snap))?;
            out.flush()?;
            last = Some(snap);
        }
        Ok(())
    }
}

/// Format one snapshot as a boxed panel.
pub fn render_panel(snap: &Snapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("╔{}╗\n", "═".repeat(INNER)));
    out.push_str(&row("ECG WORKFLOW · Beat Analysis"));
    out.push_str(&format!("╠{}╣\n", "═".repeat(INNER)));

    out.push_str(&row(&format!(
        "State: {:<18} Backend: {}",
        snap.state.to_string(),
        if snap.backend_healthy { "healthy" } else { "unavailable" }
    )));
    out.push_str(&row(""));

    out.push_str(&row("Files:"));
    for kind in SlotKind::ALL {
        let mark = if snap.missing_slots.contains(&kind) { "·" } else { "✓" };
        out.push_str(&row(&format!("  {} {:<5} {}", mark, kind.extension(), kind.description())));
    }

    if let Some(id) = &snap.session_id {
        out.push_str(&row(""));
        out.push_str(&row(&format!("Session: {}", id)));
        out.push_str(&row(&format!(
            "Beats: {} ({} previews)",
            snap.total_beats, snap.preview_count
        )));
        let sel = match snap.selection {
            Some(i) => i.to_string(),
            None => "---".to_string(),
        };
        out.push_str(&row(&format!("Selected beat: {}", sel)));
    }

    if let Some(result) = &snap.result {
        out.push_str(&row(""));
        out.push_str(&row(&format!(
            "Beat {}  label {}  →  {}",
            result.beat_index, result.actual_label, result.predicted_class
        )));
        out.push_str(&row(&format!("  {}", result.predicted_class.verdict())));
        let threshold = match result.threshold {
            Some(t) => format!("{:.2}", t),
            None => "---".to_string(),
        };
        out.push_str(&row(&format!(
            "  DTW distance: {:.2}   threshold: {}",
            result.dtw_distance, threshold
        )));
        if let Some(c) = &result.classification {
            out.push_str(&row(&format!(
                "  confidence: {:.0}%   margin: {:+.2}",
                c.confidence * 100.0,
                c.distance_to_threshold
            )));
        }
    }

    if snap.state.is_busy() {
        out.push_str(&row(""));
        out.push_str(&row("… waiting for backend"));
    }

    if let Some(err) = &snap.error {
        out.push_str(&row(""));
        for line in wrap(&format!("! {}", err.message), INNER - 4) {
            out.push_str(&row(&line));
        }
    }

    out.push_str(&format!("╚{}╝\n", "═".repeat(INNER)));
    out
}

fn row(text: &str) -> String {
    // Pad by char count, not byte count
    let body: String = text.chars().take(INNER - 2).collect();
    let pad = INNER - 2 - body.chars().count();
    format!("║  {}{}║\n", body, " ".repeat(pad))
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
