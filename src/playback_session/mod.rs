//! PlaybackSession - Cursor over precomputed segmentation frames
//!
//! ## Responsibilities
//!
//! - Clamp the frame cursor into `[0, total_frames - 1]`
//! - Previous / next / restart / scrub navigation (no wraparound)
//! - Auto-advance timer that stops on the final frame
//! - Load tokens so only the newest frame request reaches the display
//!
//! The session never performs I/O itself: navigation returns a
//! [`FrameRequest`] that the controller fetches and later checks with
//! [`PlaybackSession::is_current`].

use crate::error::{Error, Result};
use crate::periodic_task::PeriodicTask;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::str::FromStr;
use std::time::Duration;

/// Default number of precomputed frames (indices 0..=198)
pub const DEFAULT_TOTAL_FRAMES: usize = 199;

/// Default auto-advance interval (~10 fps)
pub const DEFAULT_PLAYBACK_INTERVAL_MS: u64 = 100;

/// Playback settings
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    pub total_frames: usize,
    pub interval: Duration,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            total_frames: DEFAULT_TOTAL_FRAMES,
            interval: Duration::from_millis(DEFAULT_PLAYBACK_INTERVAL_MS),
        }
    }
}

/// Playback control actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackAction {
    Previous,
    Next,
    Restart,
    TogglePlay,
}

impl FromStr for PlaybackAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prev" | "previous" => Ok(PlaybackAction::Previous),
            "next" => Ok(PlaybackAction::Next),
            "restart" => Ok(PlaybackAction::Restart),
            "play" | "toggle" | "toggle_play" => Ok(PlaybackAction::TogglePlay),
            other => Err(Error::Validation(format!(
                "Unknown playback action '{}' (expected prev, next, restart or play)",
                other
            ))),
        }
    }
}

/// A frame the controller should fetch and display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest {
    pub index: usize,
    pub token: u64,
}

/// Result of an auto-advance tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick from a cancelled timer
    Ignored,
    /// Advanced one frame; `finished` when it landed on the final frame
    Advanced { request: FrameRequest, finished: bool },
    /// Already on the final frame, playback stopped
    Finished,
}

/// PlaybackSession instance
pub struct PlaybackSession {
    settings: PlaybackSettings,
    current_frame: usize,
    playing: bool,
    timer: Option<PeriodicTask>,
    timer_generation: u64,
    load_token: u64,
}

impl PlaybackSession {
    /// Create new PlaybackSession
    ///
    /// A zero frame count is treated as a single frame.
    pub fn new(mut settings: PlaybackSettings) -> Self {
        settings.total_frames = settings.total_frames.max(1);
        Self {
            settings,
            current_frame: 0,
            playing: false,
            timer: None,
            timer_generation: 0,
            load_token: 0,
        }
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn total_frames(&self) -> usize {
        self.settings.total_frames
    }

    pub fn last_frame(&self) -> usize {
        self.settings.total_frames - 1
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    pub fn is_at_end(&self) -> bool {
        self.current_frame >= self.last_frame()
    }

    /// Clamp an arbitrary index into the valid range
    pub fn clamp_index(&self, n: i64) -> usize {
        if n <= 0 {
            0
        } else {
            usize::try_from(n)
                .unwrap_or(usize::MAX)
                .min(self.last_frame())
        }
    }

    /// Move the cursor to `n` (clamped) and request that frame
    pub fn load_frame(&mut self, n: i64) -> FrameRequest {
        self.current_frame = self.clamp_index(n);
        self.load_token += 1;

        tracing::debug!(
            requested = n,
            frame_index = self.current_frame,
            token = self.load_token,
            "Playback frame requested"
        );

        FrameRequest {
            index: self.current_frame,
            token: self.load_token,
        }
    }

    /// Request the frame under the cursor again
    pub fn reload(&mut self) -> FrameRequest {
        self.load_frame(self.current_frame as i64)
    }

    /// Advance one frame; `None` on the final frame
    pub fn next(&mut self) -> Option<FrameRequest> {
        if self.is_at_end() {
            return None;
        }
        Some(self.load_frame(self.current_frame as i64 + 1))
    }

    /// Go back one frame; `None` on the first frame
    pub fn previous(&mut self) -> Option<FrameRequest> {
        if self.current_frame == 0 {
            return None;
        }
        Some(self.load_frame(self.current_frame as i64 - 1))
    }

    pub fn restart(&mut self) -> FrameRequest {
        self.load_frame(0)
    }

    /// True if `request` is the newest frame request
    pub fn is_current(&self, request: &FrameRequest) -> bool {
        request.token == self.load_token && request.index == self.current_frame
    }

    /// Flip the play state, returns the new state
    ///
    /// `on_tick` is handed to the auto-advance timer together with the
    /// timer generation.
    pub fn toggle_play<F>(&mut self, on_tick: F) -> bool
    where
        F: FnMut(u64) -> ControlFlow<()> + Send + 'static,
    {
        if self.playing {
            self.stop_playing();
        } else {
            self.start_playing(on_tick);
        }
        self.playing
    }

    /// Start auto-advance
    ///
    /// On the final frame playback stops again right away.
    pub fn start_playing<F>(&mut self, mut on_tick: F)
    where
        F: FnMut(u64) -> ControlFlow<()> + Send + 'static,
    {
        if self.playing {
            return;
        }

        if self.is_at_end() {
            tracing::debug!(frame_index = self.current_frame, "Already on final frame, playback stops");
            self.playing = false;
            return;
        }

        self.timer_generation += 1;
        let generation = self.timer_generation;
        self.timer = Some(PeriodicTask::spawn(
            "playback-advance",
            self.settings.interval,
            move || on_tick(generation),
        ));
        self.playing = true;

        tracing::info!(
            frame_index = self.current_frame,
            generation = generation,
            "Playback started"
        );
    }

    /// Stop auto-advance, returns true if it was playing
    pub fn stop_playing(&mut self) -> bool {
        let was_playing = self.playing;
        self.playing = false;

        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }

        if was_playing {
            tracing::info!(frame_index = self.current_frame, "Playback stopped");
        }
        was_playing
    }

    /// Handle an auto-advance tick of timer `generation`
    pub fn on_tick(&mut self, generation: u64) -> TickOutcome {
        if !self.playing || generation != self.timer_generation {
            return TickOutcome::Ignored;
        }

        match self.next() {
            Some(request) => {
                let finished = self.is_at_end();
                if finished {
                    self.stop_playing();
                }
                TickOutcome::Advanced { request, finished }
            }
            None => {
                self.stop_playing();
                TickOutcome::Finished
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> PlaybackSession {
        PlaybackSession::new(PlaybackSettings::default())
    }

    fn noop(_: u64) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    #[test]
    fn test_load_frame_clamps() {
        let mut s = session();

        assert_eq!(s.load_frame(-5).index, 0);
        assert_eq!(s.current_frame(), 0);

        assert_eq!(s.load_frame(9999).index, 198);
        assert_eq!(s.current_frame(), 198);

        assert_eq!(s.load_frame(i64::MAX).index, 198);
        assert_eq!(s.load_frame(42).index, 42);
    }

    #[test]
    fn test_next_previous_bounds() {
        let mut s = session();
        assert!(s.previous().is_none());
        assert_eq!(s.current_frame(), 0);

        assert_eq!(s.next().unwrap().index, 1);
        assert_eq!(s.previous().unwrap().index, 0);

        s.load_frame(198);
        assert!(s.next().is_none());
        assert_eq!(s.current_frame(), 198);

        assert_eq!(s.restart().index, 0);
    }

    #[test]
    fn test_only_newest_request_is_current() {
        let mut s = session();
        let first = s.load_frame(10);
        let second = s.load_frame(11);

        assert!(!s.is_current(&first));
        assert!(s.is_current(&second));

        // Same index again still supersedes the earlier request
        let third = s.reload();
        assert_eq!(third.index, 11);
        assert!(!s.is_current(&second));
        assert!(s.is_current(&third));
    }

    #[test]
    fn test_zero_frames_treated_as_one() {
        let mut s = PlaybackSession::new(PlaybackSettings {
            total_frames: 0,
            interval: Duration::from_millis(100),
        });
        assert_eq!(s.total_frames(), 1);
        assert_eq!(s.load_frame(5).index, 0);
        assert!(s.is_at_end());
    }

    #[tokio::test]
    async fn test_toggle_twice_clears_timer() {
        let mut s = session();

        assert!(s.toggle_play(noop));
        assert!(s.has_timer());

        assert!(!s.toggle_play(noop));
        assert!(!s.is_playing());
        assert!(!s.has_timer());
    }

    #[tokio::test]
    async fn test_toggle_on_final_frame_stops_immediately() {
        let mut s = session();
        s.load_frame(198);

        assert!(!s.toggle_play(noop));
        assert!(!s.is_playing());
        assert!(!s.has_timer());
        assert_eq!(s.current_frame(), 198);
    }

    #[tokio::test]
    async fn test_tick_advances_and_finishes() {
        let mut s = session();
        s.load_frame(196);
        s.toggle_play(noop);
        let generation = 1;

        match s.on_tick(generation) {
            TickOutcome::Advanced { request, finished } => {
                assert_eq!(request.index, 197);
                assert!(!finished);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(s.is_playing());

        match s.on_tick(generation) {
            TickOutcome::Advanced { request, finished } => {
                assert_eq!(request.index, 198);
                assert!(finished);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!s.is_playing());
        assert!(!s.has_timer());

        // Ticks queued before the stop are ignored
        assert_eq!(s.on_tick(generation), TickOutcome::Ignored);
        assert_eq!(s.current_frame(), 198);
    }

    #[tokio::test]
    async fn test_tick_from_old_timer_ignored() {
        let mut s = session();
        s.toggle_play(noop);
        s.toggle_play(noop);
        s.toggle_play(noop);

        assert_eq!(s.on_tick(1), TickOutcome::Ignored);
        assert!(matches!(s.on_tick(2), TickOutcome::Advanced { .. }));
    }

    #[tokio::test]
    async fn test_scrub_while_playing_keeps_timer() {
        let mut s = session();
        s.toggle_play(noop);

        let request = s.load_frame(50);
        assert_eq!(request.index, 50);
        assert!(s.is_playing());
        assert!(s.has_timer());
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!("prev".parse::<PlaybackAction>().unwrap(), PlaybackAction::Previous);
        assert_eq!("next".parse::<PlaybackAction>().unwrap(), PlaybackAction::Next);
        assert_eq!("restart".parse::<PlaybackAction>().unwrap(), PlaybackAction::Restart);
        assert_eq!("play".parse::<PlaybackAction>().unwrap(), PlaybackAction::TogglePlay);
        assert!("rewind".parse::<PlaybackAction>().is_err());
    }
}
