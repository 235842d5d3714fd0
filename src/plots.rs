//! Comparison plots delivered by the backend as `data:` URIs.

use crate::error::PlotError;
use crate::types::Plots;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fs;
use std::path::{Path, PathBuf};

/// A decoded `data:<mime>;base64,<payload>` image.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl PlotImage {
    pub fn decode(uri: &str) -> Result<PlotImage, PlotError> {
        let rest = uri.strip_prefix("data:").ok_or(PlotError::NotDataUri)?;
        let (meta, payload) = rest.split_once(',').ok_or(PlotError::MissingPayload)?;
        let mime = meta
            .strip_suffix(";base64")
            .ok_or_else(|| PlotError::UnsupportedEncoding(meta.to_string()))?;
        // Line breaks are legal inside long data URIs
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = STANDARD.decode(compact)?;
        Ok(PlotImage {
            mime: mime.to_string(),
            bytes,
        })
    }

    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/svg+xml" => "svg",
            _ => "bin",
        }
    }
}

/// Write overlay/alignment/heatmap into `dir`, named `<prefix>_<kind>.<ext>`.
/// Returns the written paths in that order.
pub fn save_plots(plots: &Plots, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, PlotError> {
    fs::create_dir_all(dir).map_err(|source| PlotError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut written = Vec::new();
    for (plot, uri) in [
        ("overlay", &plots.overlay),
        ("alignment", &plots.alignment),
        ("heatmap", &plots.heatmap),
    ] {
        let img = PlotImage::decode(uri).map_err(|e| PlotError::Invalid {
            plot,
            source: Box::new(e),
        })?;
        let path = dir.join(format!("{}_{}.{}", prefix, plot, img.extension()));
        fs::write(&path, &img.bytes).map_err(|source| PlotError::Write {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }
    Ok(written)
}
