mod frame;
mod report;
mod sink;

use std::path::PathBuf;

use thiserror::Error;

pub use frame::{render, FrameBuffer, PANEL_HEIGHT, PANEL_WIDTH};
pub use report::{format_value, PanelLine, Report};
pub use sink::{build_sinks, ConsoleSink, FrameSink, Sink};

/// Which outputs receive each report.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Print the textual report to stdout.
    pub console: bool,
    /// Write the rendered 1-bit frame as a PBM file at this path.
    pub frame_path: Option<PathBuf>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            console: true,
            frame_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("{sink} sink failed: {source}")]
    Sink {
        sink: &'static str,
        #[source]
        source: std::io::Error,
    },
}
