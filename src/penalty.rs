//! Penalty playback: a looping video plus a looping soundtrack.
//!
//! The video handle is released on every stop and reopened on the next
//! start, so each penalty episode plays from frame zero.

use std::path::{Path, PathBuf};

use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{debug, info, warn};

use crate::audio::AudioChannel;
use crate::display::Surface;
use crate::error::{GuardianError, Result};

/// A seekable decoded-frame sequence.
pub trait VideoSource {
    /// `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Mat>>;

    fn rewind(&mut self) -> Result<()>;
}

/// Produces fresh handles onto the penalty video.
pub trait VideoOpener {
    type Source: VideoSource;

    fn open(&self) -> Result<Self::Source>;
}

/// What the frame loop needs from a penalty.
pub trait Penalty {
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self);

    fn read_frame(&mut self) -> Option<Mat>;

    fn render(&mut self, frame: &Mat) -> Result<()>;

    /// Final stop that also closes the audio output.
    fn shutdown(&mut self);
}

pub struct VideoFile {
    path: PathBuf,
}

impl VideoFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file and decodes one frame so a broken video fails at startup.
    pub fn probe(&self) -> Result<()> {
        let mut video = self.open()?;
        match video.next_frame()? {
            Some(_) => Ok(()),
            None => Err(GuardianError::VideoOpen(format!(
                "{} has no decodable frames",
                self.path.display()
            ))),
        }
    }
}

impl VideoOpener for VideoFile {
    type Source = VideoCapture;

    fn open(&self) -> Result<VideoCapture> {
        if !self.path.is_file() {
            return Err(GuardianError::VideoOpen(format!(
                "{} does not exist",
                self.path.display()
            )));
        }

        let path = self.path.to_string_lossy();
        let capture = VideoCapture::from_file(&path, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(GuardianError::VideoOpen(format!("cannot decode {path}")));
        }
        Ok(capture)
    }
}

impl VideoSource for VideoCapture {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        if !self.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<()> {
        if !self.set(videoio::CAP_PROP_POS_FRAMES, 0.0)? {
            return Err(GuardianError::VideoOpen("seek to first frame failed".to_string()));
        }
        Ok(())
    }
}

pub struct PenaltyPlayer<O: VideoOpener, A: AudioChannel, S: Surface> {
    opener: O,
    audio: A,
    surface: S,
    frame_size: Size,
    video: Option<O::Source>,
}

impl<O: VideoOpener, A: AudioChannel, S: Surface> PenaltyPlayer<O, A, S> {
    pub fn new(opener: O, audio: A, surface: S, frame_size: Size) -> Self {
        Self {
            opener,
            audio,
            surface,
            frame_size,
            video: None,
        }
    }

    pub fn is_video_open(&self) -> bool {
        self.video.is_some()
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    fn read_raw(video: &mut O::Source) -> Option<Mat> {
        match video.next_frame() {
            Ok(Some(frame)) => return Some(frame),
            Ok(None) => debug!("penalty video ended, rewinding"),
            Err(e) => warn!("penalty video read failed, rewinding: {e}"),
        }

        if let Err(e) = video.rewind() {
            warn!("penalty video rewind failed: {e}");
            return None;
        }

        match video.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("penalty video read failed after rewind: {e}");
                None
            }
        }
    }

    fn resize(&self, frame: &Mat) -> Result<Mat> {
        let mut resized = Mat::default();
        imgproc::resize(
            frame,
            &mut resized,
            self.frame_size,
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        Ok(resized)
    }
}

impl<O: VideoOpener, A: AudioChannel, S: Surface> Penalty for PenaltyPlayer<O, A, S> {
    fn start(&mut self) -> Result<()> {
        if self.video.is_none() {
            let mut video = self.opener.open()?;
            video.rewind()?;
            self.video = Some(video);
            info!("penalty video started");
        }
        if !self.audio.is_playing() {
            self.audio.play_looped()?;
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.audio.stop();
        if self.video.take().is_some() {
            debug!("penalty video released");
        }
        if let Err(e) = self.surface.close() {
            debug!("penalty surface was not open: {e}");
        }
    }

    fn read_frame(&mut self) -> Option<Mat> {
        let frame = Self::read_raw(self.video.as_mut()?)?;
        match self.resize(&frame) {
            Ok(resized) => Some(resized),
            Err(e) => {
                warn!("penalty frame resize failed: {e}");
                None
            }
        }
    }

    fn render(&mut self, frame: &Mat) -> Result<()> {
        self.surface.show(frame)
    }

    fn shutdown(&mut self) {
        self.stop();
        self.audio.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{solid_frame, MockAudio, MockOpener, MockSurface};

    fn player(opener: MockOpener) -> PenaltyPlayer<MockOpener, MockAudio, MockSurface> {
        PenaltyPlayer::new(opener, MockAudio::default(), MockSurface::default(), Size::new(8, 6))
    }

    #[test]
    fn start_twice_opens_once() {
        let opener = MockOpener::with_frames(3);
        let mut player = player(opener.clone());

        player.start().unwrap();
        player.start().unwrap();

        assert_eq!(opener.opens(), 1);
        assert_eq!(player.audio().plays(), 1);
        assert!(player.audio().is_playing());
    }

    #[test]
    fn stop_without_start_is_harmless() {
        let mut player = player(MockOpener::with_frames(3));
        player.stop();
        player.stop();

        assert!(!player.is_video_open());
        assert!(!player.audio().is_playing());
    }

    #[test]
    fn stop_releases_and_restart_begins_at_first_frame() {
        let opener = MockOpener::with_frames(5);
        let mut player = player(opener.clone());

        player.start().unwrap();
        player.read_frame().unwrap();
        let frame = player.read_frame().unwrap();
        player.render(&frame).unwrap();
        player.stop();

        assert!(!player.is_video_open());
        assert_eq!(opener.releases(), 1);
        assert_eq!(player.surface().closes(), 1);

        player.start().unwrap();
        let frame = player.read_frame().unwrap();
        assert_eq!(opener.opens(), 2);
        assert_eq!(MockOpener::frame_index(&frame), 0);
    }

    #[test]
    fn frames_are_resized_to_penalty_size() {
        let mut player = player(MockOpener::with_frames(2));
        player.start().unwrap();

        let frame = player.read_frame().unwrap();
        assert_eq!(frame.size().unwrap(), Size::new(8, 6));
    }

    #[test]
    fn end_of_stream_wraps_to_first_frame() {
        let mut player = player(MockOpener::with_frames(2));
        player.start().unwrap();

        let first = player.read_frame().unwrap();
        let second = player.read_frame().unwrap();
        let wrapped = player.read_frame().unwrap();

        assert_eq!(MockOpener::frame_index(&first), 0);
        assert_eq!(MockOpener::frame_index(&second), 1);
        assert_eq!(MockOpener::frame_index(&wrapped), 0);
    }

    #[test]
    fn failed_rewind_yields_no_frame() {
        let opener = MockOpener::with_frames(1).failing_rewind_after(1);
        let mut player = player(opener);
        player.start().unwrap();

        assert!(player.read_frame().is_some());
        assert!(player.read_frame().is_none());
    }

    #[test]
    fn empty_video_yields_no_frame() {
        let mut player = player(MockOpener::with_frames(0));
        player.start().unwrap();
        assert!(player.read_frame().is_none());
    }

    #[test]
    fn read_before_start_yields_nothing() {
        let mut player = player(MockOpener::with_frames(2));
        assert!(player.read_frame().is_none());
    }

    #[test]
    fn render_goes_to_penalty_surface() {
        let mut player = player(MockOpener::with_frames(2));
        player.render(&solid_frame(4, 4, 0)).unwrap();
        assert_eq!(player.surface().shown(), 1);
    }

    #[test]
    fn shutdown_closes_audio_output() {
        let mut player = player(MockOpener::with_frames(2));
        player.start().unwrap();
        player.shutdown();

        assert!(!player.audio().is_playing());
        assert!(player.audio().is_shut_down());
        assert!(!player.is_video_open());
    }

    #[test]
    fn missing_video_file_is_reported() {
        let file = VideoFile::new("/nonexistent/penalty.mp4");
        assert!(matches!(file.open(), Err(GuardianError::VideoOpen(_))));
        assert!(file.probe().is_err());
    }
}
