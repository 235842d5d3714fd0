pub mod chart;
pub mod console_display;
pub mod coords;
pub mod error;
pub mod plots;
pub mod presentation;
pub mod runner;
pub mod service;
pub mod surface;
pub mod types;
pub mod upload_slots;
pub mod workflow;
