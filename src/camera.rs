use opencv::{
    core::{self, Mat},
    prelude::*,
    videoio::{VideoCapture, VideoCaptureAPIs},
};
use tracing::debug;

use crate::error::{GuardianError, Result};

/// Anything that yields BGR frames until it runs dry.
pub trait FrameSource {
    /// `Ok(None)` means the stream is exhausted.
    fn read_frame(&mut self) -> Result<Option<Mat>>;

    fn release(&mut self) -> Result<()>;
}

pub struct Camera {
    capture: VideoCapture,
}

impl Camera {
    pub fn new(device_id: i32) -> Result<Self> {
        let capture = VideoCapture::new(device_id, VideoCaptureAPIs::CAP_ANY as i32)?;

        if !capture.is_opened()? {
            return Err(GuardianError::CameraUnavailable(device_id));
        }

        debug!(device_id, "camera opened");
        Ok(Self { capture })
    }
}

impl FrameSource for Camera {
    fn read_frame(&mut self) -> Result<Option<Mat>> {
        if !self.capture.is_opened()? {
            return Ok(None);
        }

        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }

        Ok(Some(frame))
    }

    fn release(&mut self) -> Result<()> {
        self.capture.release()?;
        Ok(())
    }
}

/// Horizontal flip so the preview behaves like a mirror.
pub fn mirror(frame: &Mat) -> Result<Mat> {
    let mut mirrored = Mat::default();
    core::flip(frame, &mut mirrored, 1)?;
    Ok(mirrored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, Vec3b, CV_8UC3};

    #[test]
    fn mirror_swaps_left_and_right() {
        let mut frame =
            Mat::new_rows_cols_with_default(2, 3, CV_8UC3, Scalar::all(0.0)).unwrap();
        *frame.at_2d_mut::<Vec3b>(0, 0).unwrap() = Vec3b::from([1, 2, 3]);

        let mirrored = mirror(&frame).unwrap();

        assert_eq!(*mirrored.at_2d::<Vec3b>(0, 2).unwrap(), Vec3b::from([1, 2, 3]));
        assert_eq!(*mirrored.at_2d::<Vec3b>(0, 0).unwrap(), Vec3b::from([0, 0, 0]));
    }
}
