//! Test doubles for the hardware-facing seams.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use opencv::core::{Mat, Scalar, Vec3b, CV_8UC3};
use opencv::prelude::*;

use crate::audio::AudioChannel;
use crate::camera::FrameSource;
use crate::display::Surface;
use crate::error::{GuardianError, Result};
use crate::face::FaceResult;
use crate::inference::LandmarkSource;
use crate::penalty::{VideoOpener, VideoSource};

pub fn solid_frame(rows: i32, cols: i32, value: u8) -> Mat {
    Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(f64::from(value))).unwrap()
}

#[derive(Default)]
struct OpenerCounters {
    opens: Cell<usize>,
    releases: Cell<usize>,
    rewinds: Cell<usize>,
}

/// Opens in-memory videos whose frame `i` is filled with the value `i * 10`.
#[derive(Clone)]
pub struct MockOpener {
    frames: usize,
    rewind_limit: Option<usize>,
    counters: Rc<OpenerCounters>,
}

impl MockOpener {
    pub fn with_frames(frames: usize) -> Self {
        Self {
            frames,
            rewind_limit: None,
            counters: Rc::default(),
        }
    }

    /// Every rewind after the first `n` fails.
    pub fn failing_rewind_after(mut self, n: usize) -> Self {
        self.rewind_limit = Some(n);
        self
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.get()
    }

    pub fn releases(&self) -> usize {
        self.counters.releases.get()
    }

    pub fn frame_index(frame: &Mat) -> usize {
        usize::from(frame.at_2d::<Vec3b>(0, 0).unwrap()[0] / 10)
    }
}

impl VideoOpener for MockOpener {
    type Source = MockVideo;

    fn open(&self) -> Result<MockVideo> {
        self.counters.opens.set(self.counters.opens.get() + 1);
        Ok(MockVideo {
            frames: self.frames,
            position: 0,
            rewind_limit: self.rewind_limit,
            counters: Rc::clone(&self.counters),
        })
    }
}

pub struct MockVideo {
    frames: usize,
    position: usize,
    rewind_limit: Option<usize>,
    counters: Rc<OpenerCounters>,
}

impl VideoSource for MockVideo {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        if self.position >= self.frames {
            return Ok(None);
        }
        let frame = solid_frame(12, 16, (self.position * 10) as u8);
        self.position += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<()> {
        let rewinds = self.counters.rewinds.get() + 1;
        self.counters.rewinds.set(rewinds);
        if self.rewind_limit.is_some_and(|limit| rewinds > limit) {
            return Err(GuardianError::VideoOpen("seek failed".to_string()));
        }
        self.position = 0;
        Ok(())
    }
}

impl Drop for MockVideo {
    fn drop(&mut self) {
        self.counters.releases.set(self.counters.releases.get() + 1);
    }
}

#[derive(Default)]
pub struct MockAudio {
    playing: bool,
    plays: usize,
    shut_down: bool,
}

impl MockAudio {
    pub fn plays(&self) -> usize {
        self.plays
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl AudioChannel for MockAudio {
    fn play_looped(&mut self) -> Result<()> {
        if self.shut_down {
            return Err(GuardianError::Audio("shut down".to_string()));
        }
        self.playing = true;
        self.plays += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn shutdown(&mut self) {
        self.playing = false;
        self.shut_down = true;
    }
}

/// Records what was shown. Closing a surface that is not open fails, like highgui.
#[derive(Clone, Default)]
pub struct MockSurface {
    open: Rc<Cell<bool>>,
    shown: Rc<Cell<usize>>,
    closes: Rc<Cell<usize>>,
    broken: bool,
}

impl MockSurface {
    /// A surface whose every `show` fails.
    pub fn failing() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn shown(&self) -> usize {
        self.shown.get()
    }

    pub fn closes(&self) -> usize {
        self.closes.get()
    }

    pub fn is_open(&self) -> bool {
        self.open.get()
    }
}

impl Surface for MockSurface {
    fn show(&mut self, frame: &Mat) -> Result<()> {
        assert!(!frame.empty(), "empty frame shown");
        if self.broken {
            return Err(GuardianError::Display("window backend unavailable".to_string()));
        }
        self.open.set(true);
        self.shown.set(self.shown.get() + 1);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.open.replace(false) {
            return Err(GuardianError::Display("no such window".to_string()));
        }
        self.closes.set(self.closes.get() + 1);
        Ok(())
    }
}

/// Yields a fixed number of blank frames.
#[derive(Clone)]
pub struct MockCamera {
    remaining: Rc<Cell<usize>>,
    released: Rc<Cell<bool>>,
}

impl MockCamera {
    pub fn with_frames(frames: usize) -> Self {
        Self {
            remaining: Rc::new(Cell::new(frames)),
            released: Rc::default(),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }
}

impl FrameSource for MockCamera {
    fn read_frame(&mut self) -> Result<Option<Mat>> {
        match self.remaining.get() {
            0 => Ok(None),
            n => {
                self.remaining.set(n - 1);
                Ok(Some(solid_frame(48, 64, 0)))
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        self.released.set(true);
        Ok(())
    }
}

/// Replays scripted detections, then reports no face.
#[derive(Default)]
pub struct ScriptedLandmarks {
    script: VecDeque<Option<FaceResult>>,
}

impl ScriptedLandmarks {
    pub fn new(script: impl IntoIterator<Item = Option<FaceResult>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl LandmarkSource for ScriptedLandmarks {
    fn detect(&mut self, _frame: &Mat) -> Result<Option<FaceResult>> {
        Ok(self.script.pop_front().flatten())
    }
}
