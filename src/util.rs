use anyhow::{bail, Context, Result};
use std::process::Command;
use std::time::Duration;

pub fn ensure_ffmpeg_available() -> Result<()> {
    let out = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .context("failed to run ffmpeg -version")?;
    if !out.status.success() {
        bail!("ffmpeg exists but returned non-zero on -version");
    }
    Ok(())
}

pub fn fmt_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}
