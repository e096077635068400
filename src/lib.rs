//! Live Tracker Library
//!
//! Real-time tracking client: live camera capture with backend annotation,
//! and playback of precomputed segmentation frames.
//!
//! ## Architecture
//!
//! 1. CameraResource - Exclusive ownership of the capture device
//! 2. FrameCaptureLoop - Periodic sampling and upload in live modes
//! 3. PlaybackSession - Cursor and auto-advance over precomputed frames
//! 4. ModeController - Mode state machine, single owner of 1-3
//! 5. BackendClient - Tracking backend HTTP adapter
//! 6. DisplayHub - Surface state and WebSocket distribution
//! 7. WebAPI - Control endpoints
//!
//! ## Design Principles
//!
//! - Single owner: only the ModeController mutates tracking state
//! - Events in, render commands out: timers and network completions
//!   re-enter the controller as events and are checked for staleness

pub mod backend_client;
pub mod camera_resource;
pub mod display_hub;
pub mod error;
pub mod frame_capture;
pub mod mode_controller;
pub mod models;
pub mod periodic_task;
pub mod playback_session;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
