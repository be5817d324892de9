use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::RenderConfig;

/// Encode progress callback, 0-100
pub type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// Media engine surface: a private working area plus one encode operation
///
/// Mirrors the load / write / exec / read / delete lifecycle of an
/// in-browser media engine so render dispatch can be exercised against a
/// stub in tests.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Prepare the engine; called once before first use
    async fn load(&mut self) -> Result<()>;

    /// Whether `load` has completed
    fn is_loaded(&self) -> bool;

    /// Write an input file into the working area
    async fn write_input(&mut self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Run one encode; `duration_secs` drives progress percentages
    async fn encode(
        &mut self,
        args: &[String],
        duration_secs: f64,
        progress: Option<&ProgressFn>,
    ) -> Result<()>;

    /// Read a produced file back out of the working area
    async fn read_output(&mut self, name: &str) -> Result<Vec<u8>>;

    /// Remove a single file from the working area
    async fn remove_file(&mut self, name: &str) -> Result<()>;

    /// Tear down the working area; safe to call on a failed engine
    async fn dispose(&mut self) -> Result<()>;
}

/// ffmpeg-backed media engine with an exclusive temporary working directory
pub struct FfmpegEngine {
    ffmpeg_path: String,
    timeout: Duration,
    workdir: Option<TempDir>,
}

impl FfmpegEngine {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            timeout: Duration::from_secs(config.timeout),
            workdir: None,
        }
    }

    /// Absolute path of a file in the working area
    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        Ok(self.workdir()?.join(name))
    }

    fn workdir(&self) -> Result<&Path> {
        self.workdir
            .as_ref()
            .map(TempDir::path)
            .ok_or_else(|| anyhow!("Media engine not loaded"))
    }

    async fn check_command_available(cmd_name: &str) -> bool {
        Command::new(cmd_name)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn load(&mut self) -> Result<()> {
        if self.workdir.is_some() {
            return Ok(());
        }

        if !Self::check_command_available(&self.ffmpeg_path).await {
            return Err(anyhow!(
                "ffmpeg not found at '{}'. Please install ffmpeg",
                self.ffmpeg_path
            ));
        }

        let workdir = TempDir::new().context("Failed to create engine working directory")?;
        debug!("Engine working directory: {}", workdir.path().display());
        self.workdir = Some(workdir);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.workdir.is_some()
    }

    async fn write_input(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_of(name)?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", name))?;
        debug!("Wrote {} ({} bytes)", name, bytes.len());
        Ok(())
    }

    async fn encode(
        &mut self,
        args: &[String],
        duration_secs: f64,
        progress: Option<&ProgressFn>,
    ) -> Result<()> {
        let workdir = self.workdir()?.to_path_buf();

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-progress", "pipe:1", "-nostats"])
            .args(args)
            .current_dir(&workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Executing command: {:?}", cmd);
        let start_time = std::time::Instant::now();

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.ffmpeg_path))?;

        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();

        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut stderr_tail: VecDeque<String> = VecDeque::new();
        let mut last_percent = 0u8;

        let status = match tokio::time::timeout(self.timeout, async {
            loop {
                tokio::select! {
                    line = stdout_lines.next_line(), if !stdout_done => {
                        match line {
                            Ok(Some(line)) => {
                                if let Some(micros) = parse_out_time_micros(&line) {
                                    let percent = encode_percent(micros, duration_secs);
                                    if percent != last_percent {
                                        last_percent = percent;
                                        if let Some(callback) = progress {
                                            callback(percent);
                                        }
                                    }
                                }
                            }
                            _ => stdout_done = true,
                        }
                    }

                    line = stderr_lines.next_line(), if !stderr_done => {
                        match line {
                            Ok(Some(line)) => {
                                debug!("ffmpeg: {}", line);
                                if stderr_tail.len() >= 20 {
                                    stderr_tail.pop_front();
                                }
                                stderr_tail.push_back(line);
                            }
                            _ => stderr_done = true,
                        }
                    }

                    status = child.wait() => {
                        return status;
                    }
                }
            }
        })
        .await
        {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "⏰ Encode timed out after {:.1}s, killing ffmpeg",
                    self.timeout.as_secs_f64()
                );
                let _ = child.kill().await;
                return Err(anyhow!(
                    "Encode timed out after {} seconds",
                    self.timeout.as_secs()
                ));
            }
        };

        if !status.success() {
            return Err(anyhow!(
                "ffmpeg failed with exit code {}: {}",
                status,
                stderr_tail.iter().cloned().collect::<Vec<_>>().join("\n")
            ));
        }

        info!(
            "✅ Encode completed in {:.1}s",
            start_time.elapsed().as_secs_f64()
        );
        if let Some(callback) = progress {
            callback(100);
        }
        Ok(())
    }

    async fn read_output(&mut self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_of(name)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", name))
    }

    async fn remove_file(&mut self, name: &str) -> Result<()> {
        let path = self.path_of(name)?;
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to remove {}", name))
    }

    async fn dispose(&mut self) -> Result<()> {
        if let Some(workdir) = self.workdir.take() {
            let path = workdir.path().to_path_buf();
            workdir
                .close()
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

/// Measure a media file's duration in seconds with ffprobe
pub async fn probe_duration(ffprobe_path: &str, media_path: &Path) -> Result<f64> {
    let output = Command::new(ffprobe_path)
        .args([
            "-i",
            media_path
                .to_str()
                .ok_or_else(|| anyhow!("Non-UTF8 media path"))?,
            "-show_entries",
            "format=duration",
            "-v",
            "quiet",
            "-of",
            "csv=p=0",
        ])
        .output()
        .await
        .with_context(|| format!("Failed to run {}", ffprobe_path))?;

    if !output.status.success() {
        return Err(anyhow!("ffprobe failed for {}", media_path.display()));
    }

    let text = String::from_utf8(output.stdout)?;
    text.trim()
        .parse::<f64>()
        .with_context(|| format!("Unparseable ffprobe duration: {:?}", text.trim()))
}

/// Synthesize a solid black background frame as PNG bytes
pub fn solid_background_png(width: u32, height: u32) -> Result<Vec<u8>> {
    let frame = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));

    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(frame)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .context("Failed to encode background frame")?;

    Ok(bytes)
}

/// Extract the elapsed encode time in microseconds from a progress line
fn parse_out_time_micros(line: &str) -> Option<u64> {
    let value = line
        .strip_prefix("out_time_us=")
        .or_else(|| line.strip_prefix("out_time_ms="))?;
    value.trim().parse().ok()
}

/// Progress percentage for an encode position
fn encode_percent(micros: u64, duration_secs: f64) -> u8 {
    if duration_secs <= 0.0 {
        return 0;
    }
    let fraction = (micros as f64 / 1_000_000.0) / duration_secs;
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_png_is_decodable() {
        let bytes = solid_background_png(64, 36).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 36);
    }

    #[test]
    fn test_progress_line_parsing() {
        assert_eq!(parse_out_time_micros("out_time_us=1500000"), Some(1_500_000));
        assert_eq!(parse_out_time_micros("out_time_ms=1500000"), Some(1_500_000));
        assert_eq!(parse_out_time_micros("frame=30"), None);
        assert_eq!(parse_out_time_micros("out_time=00:00:01.500000"), None);
    }

    #[test]
    fn test_encode_percent() {
        assert_eq!(encode_percent(0, 10.0), 0);
        assert_eq!(encode_percent(5_000_000, 10.0), 50);
        assert_eq!(encode_percent(10_000_000, 10.0), 100);
        // Encoder can report slightly past the target duration
        assert_eq!(encode_percent(12_000_000, 10.0), 100);
        assert_eq!(encode_percent(1_000_000, 0.0), 0);
    }

    #[tokio::test]
    async fn test_unloaded_engine_rejects_io() {
        let config = RenderConfig::default();
        let mut engine = FfmpegEngine::new(&config);
        assert!(!engine.is_loaded());
        assert!(engine.write_input("audio.mp3", b"x").await.is_err());
        assert!(engine.read_output("output.mp4").await.is_err());
    }

    #[test]
    fn test_dispose_without_load_is_ok() {
        tokio_test::block_on(async {
            let config = RenderConfig::default();
            let mut engine = FfmpegEngine::new(&config);
            assert!(engine.dispose().await.is_ok());
        });
    }
}
