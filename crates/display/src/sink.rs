use std::fs;
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::frame::{render, FrameBuffer};
use crate::report::Report;
use crate::{DisplayError, PanelConfig};

/// An output that shows each new report.
pub trait Sink: Send {
    fn name(&self) -> &'static str;

    /// Prepares the output before the first report, e.g. blanking a panel.
    fn init(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    fn present(&mut self, report: &Report) -> Result<(), DisplayError>;
}

/// Prints the textual report.
pub struct ConsoleSink<W> {
    out: W,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_report(&mut self, report: &Report) -> io::Result<()> {
        for line in report.console_lines() {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()
    }
}

impl<W: Write + Send> Sink for ConsoleSink<W> {
    fn name(&self) -> &'static str {
        "console"
    }

    fn present(&mut self, report: &Report) -> Result<(), DisplayError> {
        self.write_report(report).map_err(|source| DisplayError::Sink {
            sink: "console",
            source,
        })
    }
}

/// Renders the panel layout and writes it to disk as a PBM image.
///
/// The file is replaced atomically and only when the frame changed, the same
/// economy an e-paper panel needs to avoid needless full refreshes.
pub struct FrameSink {
    path: PathBuf,
    last: Option<FrameBuffer>,
    writes: u64,
}

impl FrameSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: None,
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of frames written so far, including the blank one from `init`.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn show(&mut self, frame: FrameBuffer) -> Result<bool, DisplayError> {
        if self.last.as_ref() == Some(&frame) {
            debug!(path = %self.path.display(), "frame unchanged, skipping refresh");
            return Ok(false);
        }

        write_atomic(&self.path, &frame.to_pbm()).map_err(|source| DisplayError::Sink {
            sink: "frame",
            source,
        })?;
        self.writes += 1;
        self.last = Some(frame);
        Ok(true)
    }
}

impl Sink for FrameSink {
    fn name(&self) -> &'static str {
        "frame"
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        self.last = None;
        self.show(FrameBuffer::default())?;
        info!(path = %self.path.display(), "frame output cleared");
        Ok(())
    }

    fn present(&mut self, report: &Report) -> Result<(), DisplayError> {
        if self.show(render(report))? {
            debug!(path = %self.path.display(), writes = self.writes, "frame refreshed");
        }
        Ok(())
    }
}

/// Builds the sinks enabled by `config`, console first.
pub fn build_sinks(config: &PanelConfig) -> Vec<Box<dyn Sink>> {
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    if config.console {
        sinks.push(Box::new(ConsoleSink::stdout()));
    }
    if let Some(path) = &config.frame_path {
        sinks.push(Box::new(FrameSink::new(path.clone())));
    }
    sinks
}

fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
