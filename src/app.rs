//! The per-frame monitor loop.

use std::time::Instant;

use opencv::{
    core::{Mat, Point},
    imgproc,
    prelude::*,
};
use tracing::{debug, info, warn};

use crate::camera::{self, FrameSource};
use crate::config::Thresholds;
use crate::display::{self, Surface};
use crate::error::Result;
use crate::face::{eye_bbox, FaceResult, LEFT_EYE, RIGHT_EYE};
use crate::focus::{self, Verdict};
use crate::inference::LandmarkSource;
use crate::penalty::Penalty;
use crate::timer::{AttentionTimer, TimerUpdate};

const LABEL_ORIGIN: (i32, i32) = (20, 50);
const LABEL_SCALE: f64 = 0.8;
const STROKE: i32 = 2;

/// What one tick produced, for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub verdict: Verdict,
    pub status: String,
    pub penalty_active: bool,
    pub penalty_frame_shown: bool,
}

/// Owns every per-run resource and releases them on drop.
pub struct FrameLoop<C: FrameSource, L: LandmarkSource, P: Penalty, S: Surface> {
    camera: C,
    landmarks: L,
    penalty: P,
    main_surface: S,
    thresholds: Thresholds,
    timer: AttentionTimer,
    key_poll_ms: i32,
    torn_down: bool,
}

impl<C: FrameSource, L: LandmarkSource, P: Penalty, S: Surface> FrameLoop<C, L, P, S> {
    pub fn new(
        camera: C,
        landmarks: L,
        penalty: P,
        main_surface: S,
        thresholds: Thresholds,
        timer: AttentionTimer,
        key_poll_ms: i32,
    ) -> Self {
        Self {
            camera,
            landmarks,
            penalty,
            main_surface,
            thresholds,
            timer,
            key_poll_ms,
            torn_down: false,
        }
    }

    pub fn timer(&self) -> &AttentionTimer {
        &self.timer
    }

    pub fn penalty(&self) -> &P {
        &self.penalty
    }

    /// Runs until Escape is pressed or the camera stops delivering frames.
    pub fn run(&mut self) -> Result<()> {
        info!("FocusGuardian is active...");
        let mut frames = 0u64;

        loop {
            if !self.step()? {
                break;
            }
            frames += 1;

            if display::quit_requested(self.key_poll_ms)? {
                info!("quit requested");
                break;
            }
        }

        debug!(frames, "monitor loop finished");
        self.teardown();
        Ok(())
    }

    /// Pulls and processes one camera frame. Returns `false` when the camera is exhausted.
    pub fn step(&mut self) -> Result<bool> {
        let raw = match self.camera.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("camera stream ended");
                return Ok(false);
            }
            Err(e) => {
                warn!("camera read failed: {e}");
                return Ok(false);
            }
        };

        let mut frame = match camera::mirror(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("skipping frame, mirror failed: {e}");
                return Ok(true);
            }
        };

        let face = match self.landmarks.detect(&frame) {
            Ok(face) => face,
            Err(e) => {
                warn!("landmark detection failed: {e}");
                None
            }
        };

        let report = self.tick(&mut frame, face.as_ref(), Instant::now());
        debug!(
            status = %report.status,
            focused = report.verdict.focused,
            penalty = report.penalty_active,
            penalty_frame = report.penalty_frame_shown,
            "tick"
        );
        Ok(true)
    }

    /// Classifies one mirrored frame at time `now` and drives the penalty.
    ///
    /// Drawing and display failures are logged; the timer and the penalty
    /// still advance.
    pub fn tick(&mut self, frame: &mut Mat, face: Option<&FaceResult>, now: Instant) -> TickReport {
        let verdict = match face {
            Some(face) => {
                let verdict = focus::classify(&face.landmarks, &face.blendshapes, &self.thresholds);
                if let Err(e) = draw_eye_boxes(frame, face, &verdict) {
                    warn!("eye boxes not drawn: {e}");
                }
                verdict
            }
            None => Verdict::no_face(),
        };

        let update = self.timer.update(verdict.focused, now);
        match update {
            TimerUpdate::Focused { penalty_ended: true } => {
                self.penalty.stop();
                info!("You came back! Video stopped");
            }
            TimerUpdate::Away {
                penalty_started: true,
                elapsed,
            } => info!(elapsed_secs = elapsed.as_secs_f64(), "penalty started"),
            _ => {}
        }

        let mut status = verdict.label.clone();
        if let Some(suffix) = update.label_suffix() {
            status.push_str(&suffix);
        }

        if let Err(e) = self.show_status(frame, &status, &verdict) {
            warn!("status frame not shown: {e}");
        }

        let penalty_active = self.timer.penalty_active();
        let penalty_frame_shown = penalty_active && self.play_penalty();

        TickReport {
            verdict,
            status,
            penalty_active,
            penalty_frame_shown,
        }
    }

    fn show_status(&mut self, frame: &mut Mat, status: &str, verdict: &Verdict) -> Result<()> {
        imgproc::put_text(
            frame,
            status,
            Point::new(LABEL_ORIGIN.0, LABEL_ORIGIN.1),
            imgproc::FONT_HERSHEY_SIMPLEX,
            LABEL_SCALE,
            verdict.color.to_scalar(),
            STROKE,
            imgproc::LINE_8,
            false,
        )?;
        self.main_surface.show(frame)
    }

    fn play_penalty(&mut self) -> bool {
        if let Err(e) = self.penalty.start() {
            warn!("penalty playback unavailable: {e}");
            return false;
        }
        let Some(video_frame) = self.penalty.read_frame() else {
            return false;
        };
        match self.penalty.render(&video_frame) {
            Ok(()) => true,
            Err(e) => {
                warn!("penalty frame not shown: {e}");
                false
            }
        }
    }

    /// Releases the camera, the penalty and the windows. Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = self.camera.release() {
            warn!("camera release failed: {e}");
        }
        self.penalty.shutdown();
        if let Err(e) = self.main_surface.close() {
            debug!("main window already closed: {e}");
        }
        debug!("resources released");
    }
}

impl<C: FrameSource, L: LandmarkSource, P: Penalty, S: Surface> Drop for FrameLoop<C, L, P, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn draw_eye_boxes(frame: &mut Mat, face: &FaceResult, verdict: &Verdict) -> Result<()> {
    let (width, height) = (frame.cols(), frame.rows());
    for indices in [&LEFT_EYE[..], &RIGHT_EYE[..]] {
        if let Some(rect) = eye_bbox(&face.landmarks, indices, width, height) {
            imgproc::rectangle(
                frame,
                rect,
                verdict.color.to_scalar(),
                STROKE,
                imgproc::LINE_8,
                0,
            )?;
        }
    }
    Ok(())
}
