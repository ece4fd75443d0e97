//! Audio transcode fallback.
//!
//! The engine's own postprocessor normally delivers mp3 directly; this path
//! covers the case where an audio task produced some other container. The
//! transcode runs under a hard 5-minute wall-clock limit.

use std::path::Path;

use tokio::process::Command;

use crate::core::config;
use crate::core::error::AppError;
use crate::core::process::run_with_timeout;

/// Converts an audio/video file to mp3 via ffmpeg.
///
/// # Arguments
/// * `input_path` - Source file (any container ffmpeg can read)
/// * `output_path` - Target mp3 path; overwritten if present
pub async fn convert_to_mp3(input_path: &Path, output_path: &Path) -> Result<(), AppError> {
    let ffmpeg_bin = &*config::FFMPEG_BIN;

    if !input_path.exists() {
        return Err(AppError::Transcode(format!(
            "Input file not found: {}",
            input_path.display()
        )));
    }

    log::info!("Transcoding {} to mp3", input_path.display());

    let mut cmd = Command::new(ffmpeg_bin);
    cmd.arg("-i")
        .arg(input_path)
        .args(["-vn", "-acodec", "libmp3lame", "-q:a", "2", "-y"])
        .arg(output_path);

    let output = run_with_timeout(&mut cmd, config::download::transcode_timeout())
        .await
        .map_err(|e| match e {
            // Timeouts surface as Download from the helper; re-tag them
            AppError::Download(msg) => AppError::Transcode(msg),
            other => other,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr.chars().rev().take(300).collect::<Vec<_>>().into_iter().rev().collect();
        return Err(AppError::Transcode(format!("ffmpeg failed: {}", tail.trim())));
    }

    if !output_path.exists() {
        return Err(AppError::Transcode(
            "ffmpeg reported success but produced no output file".to_string(),
        ));
    }

    Ok(())
}
