use std::path::PathBuf;

use tracing::debug;

use crate::error::JobError;

pub mod converter;
pub mod probe;

/// Locates an ffmpeg-family binary by name or path.
#[derive(Clone, Debug)]
pub struct FFmpegTool {
    pub name: String,
}

impl FFmpegTool {
    pub fn new(name: &str) -> Self {
        FFmpegTool { name: String::from(name) }
    }

    pub fn locate(&self) -> Result<PathBuf, JobError> {
        match which::which(&self.name) {
            Ok(path) => {
                debug!("found {} at {:?}", self.name, path);
                Ok(path)
            },
            Err(_) => Err(JobError::ToolNotFound { tool: self.name.clone() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool() {
        let tool = FFmpegTool::new("definitely-not-an-ffmpeg-binary-7f3a");
        assert!(matches!(tool.locate(), Err(JobError::ToolNotFound { .. })));
    }
}
