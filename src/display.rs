use opencv::{core::Mat, highgui};

use crate::error::Result;

const ESCAPE: i32 = 27;

/// A place frames get shown, one per tick.
pub trait Surface {
    fn show(&mut self, frame: &Mat) -> Result<()>;

    /// Tears the surface down. Fails if it was never shown.
    fn close(&mut self) -> Result<()>;
}

/// A highgui window, created lazily by the first `show`.
pub struct Window {
    title: String,
}

impl Window {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Surface for Window {
    fn show(&mut self, frame: &Mat) -> Result<()> {
        highgui::imshow(&self.title, frame)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        highgui::destroy_window(&self.title)?;
        Ok(())
    }
}

/// Pumps the GUI event queue for `delay_ms` and reports whether Escape was hit.
pub fn quit_requested(delay_ms: i32) -> Result<bool> {
    let key = highgui::wait_key(delay_ms)?;
    Ok(key >= 0 && key & 0xFF == ESCAPE)
}

pub fn close_all() -> Result<()> {
    highgui::destroy_all_windows()?;
    Ok(())
}
