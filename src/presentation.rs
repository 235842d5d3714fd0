//! Navigation and entrance-animation capabilities.
//!
//! Both are injected into the runner so a headless build can drop them
//! (or log them) without touching workflow logic.

use log::{debug, info};
use std::fmt;

// ─── Navigation ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Landing,
    Analysis,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Landing => "/",
            Route::Analysis => "/analysis",
        }
    }

    pub fn from_path(path: &str) -> Option<Route> {
        match path.trim_end_matches('/') {
            "" => Some(Route::Landing),
            "/analysis" => Some(Route::Analysis),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

pub trait Navigator: Send {
    fn navigate_to(&mut self, route: Route);
}

/// Tracks the current route and logs every change.
#[derive(Debug)]
pub struct LogNavigator {
    current: Route,
}

impl LogNavigator {
    pub fn new() -> Self {
        Self {
            current: Route::Landing,
        }
    }

    pub fn current(&self) -> Route {
        self.current
    }
}

impl Default for LogNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator for LogNavigator {
    fn navigate_to(&mut self, route: Route) {
        if route != self.current {
            info!("Navigate {} → {}", self.current, route);
            self.current = route;
        }
    }
}

// ─── Animation ──────────────────────────────────────────────────────────────

/// Sections of the analysis page that animate in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    UploadSection,
    BeatSelection,
    Results,
}

/// "From" parameters of an entrance tween: elements start offset by
/// `offset_y` px at `opacity`/`scale` and ease to their resting state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationSpec {
    pub offset_y: f32,
    pub opacity: f32,
    pub scale: f32,
    pub duration_s: f32,
    /// Delay between consecutive children, seconds.
    pub stagger_s: f32,
    pub ease: &'static str,
}

impl AnimationSpec {
    pub const UPLOAD_SECTION: AnimationSpec = AnimationSpec {
        offset_y: 30.0,
        opacity: 0.0,
        scale: 1.0,
        duration_s: 0.6,
        stagger_s: 0.15,
        ease: "power2.out",
    };

    pub const BEAT_SELECTION: AnimationSpec = AnimationSpec {
        offset_y: 30.0,
        opacity: 0.0,
        scale: 0.95,
        duration_s: 0.6,
        stagger_s: 0.0,
        ease: "back.out(1.2)",
    };

    pub const RESULT_CARDS: AnimationSpec = AnimationSpec {
        offset_y: 40.0,
        opacity: 0.0,
        scale: 1.0,
        duration_s: 0.5,
        stagger_s: 0.1,
        ease: "power2.out",
    };

    pub fn for_view(view: View) -> &'static AnimationSpec {
        match view {
            View::UploadSection => &Self::UPLOAD_SECTION,
            View::BeatSelection => &Self::BEAT_SELECTION,
            View::Results => &Self::RESULT_CARDS,
        }
    }

    /// Total time until the last of `children` settles.
    pub fn total_duration_s(&self, children: usize) -> f32 {
        self.duration_s + self.stagger_s * children.saturating_sub(1) as f32
    }
}

pub trait AnimationDriver: Send {
    fn on_mount(&mut self, view: View, spec: &AnimationSpec);
    fn on_scroll_into(&mut self, view: View, spec: &AnimationSpec);
}

/// Headless builds: no animation at all.
#[derive(Debug, Default)]
pub struct NoAnimation;

impl AnimationDriver for NoAnimation {
    fn on_mount(&mut self, view: View, _spec: &AnimationSpec) {
        debug!("mount {:?}", view);
    }

    fn on_scroll_into(&mut self, _view: View, _spec: &AnimationSpec) {}
}
