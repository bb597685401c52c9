use crate::config::{Container, Resolution};
use anyhow::{bail, Context, Result};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// An ffmpeg child process consuming raw RGB24 frames on stdin and muxing
/// H.264 into the requested container.
///
/// Output goes to a `.part` sibling first and is renamed into place only
/// after ffmpeg exits cleanly, so an interrupted run never leaves behind a
/// file that looks complete.
pub struct VideoEncoder {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    temp_path: PathBuf,
    final_path: PathBuf,
    frame_bytes: usize,
}

impl VideoEncoder {
    pub fn spawn(
        output: &Path,
        resolution: Resolution,
        fps: u32,
        container: Container,
    ) -> Result<Self> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
        }
        let temp_path = partial_path(output);

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(resolution.to_string())
            .arg("-r")
            .arg(fps.to_string())
            .arg("-i")
            .arg("pipe:0")
            .arg("-c:v")
            .arg("libx264")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-an")
            // The container is chosen explicitly so the .part suffix on the
            // temp file cannot confuse ffmpeg's extension sniffing.
            .arg("-f")
            .arg(container.muxer())
            .arg(&temp_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().context("failed to spawn ffmpeg")?;
        let stdin = child.stdin.take().context("ffmpeg stdin unavailable")?;

        Ok(Self {
            child,
            stdin: Some(BufWriter::with_capacity(4 * 1024 * 1024, stdin)),
            temp_path,
            final_path: output.to_path_buf(),
            frame_bytes: resolution.frame_bytes(),
        })
    }

    pub fn write_frame(&mut self, rgb: &[u8]) -> Result<()> {
        if rgb.len() != self.frame_bytes {
            bail!(
                "frame size mismatch: got {} bytes, expected {}",
                rgb.len(),
                self.frame_bytes
            );
        }
        let writer = self
            .stdin
            .as_mut()
            .context("encoder already finished")?;
        writer.write_all(rgb).context("writing frame to ffmpeg")?;
        Ok(())
    }

    /// Close stdin, wait for ffmpeg, and move the temp file into place.
    /// On a non-zero exit the temp file is removed and ffmpeg's stderr is
    /// carried in the error.
    pub fn finish(mut self) -> Result<PathBuf> {
        if let Some(mut writer) = self.stdin.take() {
            writer.flush().context("flushing frames to ffmpeg")?;
        }

        let output = self
            .child
            .wait_with_output()
            .context("waiting for ffmpeg")?;
        if !output.status.success() {
            let _ = fs::remove_file(&self.temp_path);
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "ffmpeg failed writing {} ({}): {}",
                self.final_path.display(),
                output.status,
                stderr.trim()
            );
        }

        fs::rename(&self.temp_path, &self.final_path).with_context(|| {
            format!(
                "moving {} into place as {}",
                self.temp_path.display(),
                self.final_path.display()
            )
        })?;
        Ok(self.final_path)
    }

    /// Kill ffmpeg and discard the partial output. Used on cancellation and
    /// on mid-stream errors.
    pub fn abort(mut self) {
        self.stdin.take();
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = fs::remove_file(&self.temp_path);
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output".into());
    name.push(".part");
    output.with_file_name(name)
}
