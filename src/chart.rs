use crate::coords::map_samples;
use crate::error::SurfaceError;
use crate::surface::{Color, RasterSurface, Surface, TextStyle};
use log::{debug, warn};
use std::path::Path;

/// Grid subdivisions along each axis.
pub const GRID_DIVISIONS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ChartOptions {
    pub width: u32,
    pub height: u32,
    pub padding: f64,
    pub color: Color,
    pub line_width: f64,
    pub show_grid: bool,
    pub grid_color: Color,
    pub caption_color: Color,
    pub x_caption: String,
    pub y_caption: String,
    /// Physical pixels per logical pixel.
    pub device_pixel_ratio: f64,
    pub background: Color,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 200,
            padding: 40.0,
            color: Color::rgb(0x25, 0x63, 0xeb),
            line_width: 2.0,
            show_grid: true,
            grid_color: Color::rgb(0xe2, 0xe8, 0xf0),
            caption_color: Color::rgb(0x47, 0x55, 0x69),
            x_caption: "Time (ms)".into(),
            y_caption: "Amplitude (mV)".into(),
            device_pixel_ratio: 1.0,
            background: Color::WHITE,
        }
    }
}

/// Draw a line chart of `samples` onto `surface`.
///
/// Empty input is a no-op: nothing is cleared or drawn. Returns whether
/// anything was drawn. Captions are skipped when no font is available.
pub fn draw_chart<S: Surface + ?Sized>(
    surface: &mut S,
    samples: &[f64],
    opts: &ChartOptions,
) -> Result<bool, SurfaceError> {
    if samples.is_empty() {
        return Ok(false);
    }
    let (width, height) = surface.size();
    let pad = opts.padding;

    surface.clear()?;

    if opts.show_grid {
        let chart_w = width - 2.0 * pad;
        let chart_h = height - 2.0 * pad;
        for i in 0..=GRID_DIVISIONS {
            let y = pad + chart_h / GRID_DIVISIONS as f64 * i as f64;
            surface.stroke_polyline(&[(pad, y), (width - pad, y)], opts.grid_color, 1.0)?;
        }
        for i in 0..=GRID_DIVISIONS {
            let x = pad + chart_w / GRID_DIVISIONS as f64 * i as f64;
            surface.stroke_polyline(&[(x, pad), (x, height - pad)], opts.grid_color, 1.0)?;
        }
    }

    // Non-finite samples split the trace into separate runs.
    let points = map_samples(samples, width, height, pad);
    for run in points.split(|&(x, y)| !(x.is_finite() && y.is_finite())) {
        if !run.is_empty() {
            surface.stroke_polyline(run, opts.color, opts.line_width)?;
        }
    }

    let caption = TextStyle {
        size: 12.0,
        color: opts.caption_color,
        rotate_ccw: false,
    };
    let captions = surface
        .fill_text(&opts.x_caption, width / 2.0, height - 10.0, &caption)
        .and_then(|()| {
            surface.fill_text(
                &opts.y_caption,
                15.0,
                height / 2.0,
                &TextStyle {
                    rotate_ccw: true,
                    ..caption
                },
            )
        });
    match captions {
        Ok(()) => {}
        Err(SurfaceError::NoFont) => debug!("Chart captions skipped: no font"),
        Err(e) => warn!("Chart captions failed: {}", e),
    }

    debug!("Rendered {} samples at {}x{}", samples.len(), width, height);
    Ok(true)
}

/// Chart bound to its own raster surface.
pub struct ChartRenderer {
    opts: ChartOptions,
    surface: RasterSurface,
}

impl ChartRenderer {
    pub fn new(opts: ChartOptions) -> Self {
        let surface = RasterSurface::new(opts.width, opts.height, opts.device_pixel_ratio)
            .with_background(opts.background);
        Self { opts, surface }
    }

    pub fn options(&self) -> &ChartOptions {
        &self.opts
    }

    pub fn render(&mut self, samples: &[f64]) -> Result<bool, SurfaceError> {
        draw_chart(&mut self.surface, samples, &self.opts)
    }

    pub fn surface(&self) -> &RasterSurface {
        &self.surface
    }

    pub fn save_png(&self, path: &Path) -> Result<(), image::ImageError> {
        self.surface.save_png(path)
    }
}
