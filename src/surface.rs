//! Drawing surfaces for the chart renderer.
//!
//! All coordinates passed to a [`Surface`] are logical pixels. A surface with
//! a device pixel ratio > 1 is backed by a larger physical buffer and scales
//! every primitive, so strokes stay crisp on dense displays.

use crate::error::SurfaceError;
use log::{debug, warn};
use plotters::element::{Circle, PathElement, Text};
use plotters::prelude::{BitMapBackend, IntoDrawingArea};
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{register_font, Color as _, FontStyle, FontTransform, IntoFont, RGBColor};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Upper bound on the device pixel ratio; larger requests are clamped.
pub const MAX_DEVICE_PIXEL_RATIO: f64 = 8.0;

const FONT_FAMILY: &str = "sans-serif";

/// Checked in order after `ECG_CHART_FONT`.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` or `#rgb`.
    pub fn from_hex(s: &str) -> Option<Color> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        let digit = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
        match hex.len() {
            6 => {
                let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
                Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?))
            }
            3 => Some(Color::rgb(digit(0)? * 17, digit(1)? * 17, digit(2)? * 17)),
            _ => None,
        }
    }

    fn to_plotters(self) -> RGBColor {
        RGBColor(self.r, self.g, self.b)
    }
}

/// Text placement. `(x, y)` is the horizontally centred anchor on the
/// baseline; with `rotate_ccw` the text runs bottom-to-top around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f64,
    pub color: Color,
    pub rotate_ccw: bool,
}

pub trait Surface {
    /// Logical size (before device scaling).
    fn size(&self) -> (f64, f64);
    fn clear(&mut self) -> Result<(), SurfaceError>;
    fn stroke_polyline(
        &mut self,
        points: &[(f64, f64)],
        color: Color,
        width: f64,
    ) -> Result<(), SurfaceError>;
    fn fill_text(&mut self, text: &str, x: f64, y: f64, style: &TextStyle)
        -> Result<(), SurfaceError>;
}

// ─── Fonts ──────────────────────────────────────────────────────────────────

static CAPTION_FONT: OnceLock<bool> = OnceLock::new();

/// Registers the first loadable TrueType font as `sans-serif`, once.
pub fn caption_font_available() -> bool {
    *CAPTION_FONT.get_or_init(|| {
        let candidates = std::env::var_os("ECG_CHART_FONT")
            .map(PathBuf::from)
            .into_iter()
            .chain(FONT_CANDIDATES.iter().map(PathBuf::from));
        for path in candidates {
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            // plotters keeps registered font data for the life of the process
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            if register_font(FONT_FAMILY, FontStyle::Normal, bytes).is_ok() {
                debug!("Chart font: {}", path.display());
                return true;
            }
        }
        warn!("No TrueType font found, chart captions are skipped (set ECG_CHART_FONT)");
        false
    })
}

// ─── Raster surface ─────────────────────────────────────────────────────────

/// RGB pixel buffer drawn through plotters' bitmap backend.
/// Physical size = ceil(logical × device ratio).
pub struct RasterSurface {
    buffer: Vec<u8>,
    physical: (u32, u32),
    width: f64,
    height: f64,
    scale: f64,
    background: Color,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32, device_pixel_ratio: f64) -> Self {
        let scale = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio.min(MAX_DEVICE_PIXEL_RATIO)
        } else {
            1.0
        };
        let pw = ((width as f64 * scale).ceil() as u32).max(1);
        let ph = ((height as f64 * scale).ceil() as u32).max(1);
        let mut surface = Self {
            buffer: vec![0; pw as usize * ph as usize * 3],
            physical: (pw, ph),
            width: width as f64,
            height: height as f64,
            scale,
            background: Color::WHITE,
        };
        surface.fill_background();
        surface
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background = color;
        self.fill_background();
        self
    }

    pub fn physical_size(&self) -> (u32, u32) {
        self.physical
    }

    /// Row-major RGB bytes.
    pub fn as_raw(&self) -> &[u8] {
        &self.buffer
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let (w, h) = self.physical;
        if x >= w || y >= h {
            return None;
        }
        let i = (y as usize * w as usize + x as usize) * 3;
        Some(Color::rgb(self.buffer[i], self.buffer[i + 1], self.buffer[i + 2]))
    }

    pub fn save_png(&self, path: &Path) -> Result<(), image::ImageError> {
        let (w, h) = self.physical;
        image::save_buffer(path, &self.buffer, w, h, image::ExtendedColorType::Rgb8)
    }

    fn fill_background(&mut self) {
        let bg = self.background;
        for px in self.buffer.chunks_exact_mut(3) {
            px.copy_from_slice(&[bg.r, bg.g, bg.b]);
        }
    }

    fn to_physical(&self, (x, y): (f64, f64)) -> (i32, i32) {
        ((x * self.scale).round() as i32, (y * self.scale).round() as i32)
    }
}

fn draw_err(e: impl std::fmt::Display) -> SurfaceError {
    SurfaceError::Draw(e.to_string())
}

impl Surface for RasterSurface {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn clear(&mut self) -> Result<(), SurfaceError> {
        let bg = self.background.to_plotters();
        let root = BitMapBackend::with_buffer(&mut self.buffer, self.physical).into_drawing_area();
        root.fill(&bg).map_err(draw_err)?;
        root.present().map_err(draw_err)
    }

    fn stroke_polyline(
        &mut self,
        points: &[(f64, f64)],
        color: Color,
        width: f64,
    ) -> Result<(), SurfaceError> {
        if points.is_empty() {
            return Ok(());
        }
        let stroke = ((width * self.scale).round() as u32).max(1);
        let style = color.to_plotters().stroke_width(stroke);
        let path: Vec<(i32, i32)> = points.iter().map(|&p| self.to_physical(p)).collect();

        let root = BitMapBackend::with_buffer(&mut self.buffer, self.physical).into_drawing_area();
        if let [only] = path.as_slice() {
            let dot = Circle::new(*only, (stroke / 2).max(1), style.filled());
            root.draw(&dot).map_err(draw_err)?;
        } else {
            root.draw(&PathElement::new(path, style)).map_err(draw_err)?;
        }
        root.present().map_err(draw_err)
    }

    fn fill_text(
        &mut self,
        text: &str,
        x: f64,
        y: f64,
        style: &TextStyle,
    ) -> Result<(), SurfaceError> {
        if text.is_empty() {
            return Ok(());
        }
        if !caption_font_available() {
            return Err(SurfaceError::NoFont);
        }
        let mut font = (FONT_FAMILY, style.size * self.scale)
            .into_font()
            .color(&style.color.to_plotters())
            .pos(Pos::new(HPos::Center, VPos::Bottom));
        if style.rotate_ccw {
            font = font.transform(FontTransform::Rotate270);
        }
        let anchor = self.to_physical((x, y));

        let root = BitMapBackend::with_buffer(&mut self.buffer, self.physical).into_drawing_area();
        root.draw(&Text::new(text.to_string(), anchor, font))
            .map_err(draw_err)?;
        root.present().map_err(draw_err)
    }
}
