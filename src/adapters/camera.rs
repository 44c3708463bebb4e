//! Simulated camera.
//!
//! Produces blank RGB frames at the configured resolution.  An optional
//! frame budget models a recorded clip running out.

use crate::app::ports::{CameraPort, Frame};
use crate::config::CameraConfig;
use crate::error::CaptureError;

pub struct SimCamera {
    width: u32,
    height: u32,
    remaining: Option<u64>,
}

impl SimCamera {
    pub fn new(cfg: &CameraConfig) -> Self {
        Self {
            width: cfg.width,
            height: cfg.height,
            remaining: None,
        }
    }

    /// Report `EndOfStream` after `frames` captures.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }
}

impl CameraPort for SimCamera {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        if let Some(left) = self.remaining.as_mut() {
            if *left == 0 {
                return Err(CaptureError::EndOfStream);
            }
            *left -= 1;
        }
        Ok(Frame {
            width: self.width,
            height: self.height,
            pixels: vec![0; self.width as usize * self.height as usize * 3],
        })
    }
}
