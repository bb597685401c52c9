use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Every image is shown for half a second.
pub const FRAMES_PER_SECOND: u32 = 2;

/// Target video resolution. Both dimensions are required to be non-zero,
/// enforced at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn frame_bytes(self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((w, h)) = s.split_once(['x', 'X']) else {
            bail!("expected <width>x<height>, e.g. 1920x1080, got {s:?}");
        };
        let width: u32 = w
            .trim()
            .parse()
            .with_context(|| format!("bad width in resolution {s:?}"))?;
        let height: u32 = h
            .trim()
            .parse()
            .with_context(|| format!("bad height in resolution {s:?}"))?;
        if width == 0 || height == 0 {
            bail!("resolution dimensions must be positive, got {s:?}");
        }
        Ok(Self { width, height })
    }
}

/// Output container. The codec is always H.264; only the muxer differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum Container {
    Mp4,
    Avi,
    Mov,
}

impl Container {
    pub fn muxer(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Avi => "avi",
            Container::Mov => "mov",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" => Some(Container::Mp4),
            "avi" => Some(Container::Avi),
            "mov" => Some(Container::Mov),
            _ => None,
        }
    }

    /// Container for an output path: its own extension when recognized,
    /// otherwise the configured fallback.
    pub fn for_path(path: &Path, fallback: Self) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .unwrap_or(fallback)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.muxer())
    }
}

/// One run's worth of configuration, built once in `main` and passed by
/// reference into the pipeline. The pipeline keeps no state of its own.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    pub root: PathBuf,
    pub resolution: Resolution,
    pub container: Container,
    pub workers: usize,
}

impl ConvertConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            bail!(
                "input root {} is not an existing directory",
                self.root.display()
            );
        }
        Ok(())
    }
}
