use std::fmt::Display;
use std::path::Path;

use crate::error::JobError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
    pub width: u64,
    pub height: u64,
}

impl Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub fps: f64,
    pub frame_count: u64,
    pub resolution: Resolution,
}

impl MediaInfo {
    /// Duration in seconds, or `None` when the frame rate is unusable.
    pub fn duration_seconds(&self) -> Option<f64> {
        if self.fps.is_finite() && self.fps > 0.0 {
            Some(self.frame_count as f64 / self.fps)
        } else {
            None
        }
    }
}

/// Reads stream metadata from a media file.
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<MediaInfo, JobError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_seconds() {
        let info = MediaInfo { fps: 30.0, frame_count: 300, resolution: Resolution { width: 0, height: 0 } };
        assert_eq!(info.duration_seconds(), Some(10.0));
        let broken = MediaInfo { fps: 0.0, ..info };
        assert_eq!(broken.duration_seconds(), None);
    }

    #[test]
    fn test_resolution_display() {
        assert_eq!(format!("{}", Resolution { width: 5760, height: 2880 }), "5760x2880");
    }
}
