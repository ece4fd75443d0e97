//! Parsing of yt-dlp progress output.
//!
//! With `--newline`, yt-dlp emits one `[download]` line per progress tick:
//! `[download]  45.2% of 10.00MiB at 500.00KiB/s ETA 00:10`. Playlist runs
//! additionally announce each item with
//! `[download] Downloading item 3 of 10`.

/// One parsed progress tick from the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Percent of the current item, clamped to 0-100
    pub percent: f32,
    /// Raw speed in bytes per second, when present on the line
    pub speed_bps: Option<f64>,
    /// Remaining time in seconds, when present on the line
    pub eta_seconds: Option<u64>,
    /// Total size of the current item in bytes, when present on the line
    pub total_bytes: Option<u64>,
}

/// Parses a progress tick from a yt-dlp output line.
///
/// Returns `None` for non-progress lines (destinations, merges, warnings).
pub fn parse_progress(line: &str) -> Option<ProgressUpdate> {
    if !line.contains("[download]") {
        return None;
    }

    if !line.contains('%') {
        // Some other download message, e.g. "[download] Destination: ..."
        log::trace!("Download line without percent: {}", line);
        return None;
    }

    let mut percent = None;
    let mut speed_bps = None;
    let mut eta_seconds = None;
    let mut total_bytes = None;

    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if part.ends_with('%') {
            if let Ok(p) = part.trim_end_matches('%').parse::<f32>() {
                // Clamp to sane bounds so garbage lines can't jump to 100%
                percent = Some(p.clamp(0.0, 100.0));
            }
        }

        // Size: "of 10.00MiB"
        if *part == "of" && i + 1 < parts.len() {
            if let Some(size) = parse_size(parts[i + 1]) {
                total_bytes = Some(size);
            }
        }

        // Speed: "at 500.00KiB/s" or "at 2.3MiB/s"
        if *part == "at" && i + 1 < parts.len() {
            if let Some(speed) = parse_size(parts[i + 1]) {
                speed_bps = Some(speed as f64);
            }
        }

        // ETA: "ETA 00:10" or "ETA 1:23"
        if *part == "ETA" && i + 1 < parts.len() {
            if let Some(eta) = parse_eta(parts[i + 1]) {
                eta_seconds = Some(eta);
            }
        }
    }

    percent.map(|p| ProgressUpdate {
        percent: p,
        speed_bps,
        eta_seconds,
        total_bytes,
    })
}

/// Detects a playlist item announcement.
///
/// Matches `[download] Downloading item 3 of 10` (and the older
/// `Downloading video 3 of 10` wording). Returns the 1-based item index and
/// the playlist item count.
pub fn parse_playlist_item(line: &str) -> Option<(u32, u32)> {
    if !line.contains("[download]") || !line.contains("Downloading") {
        return None;
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if (*part == "item" || *part == "video") && i + 3 <= parts.len() {
            if parts.get(i + 2) == Some(&"of") {
                if let (Some(Ok(index)), Some(Ok(total))) = (
                    parts.get(i + 1).map(|s| s.parse::<u32>()),
                    parts.get(i + 3).map(|s| s.parse::<u32>()),
                ) {
                    return Some((index, total));
                }
            }
        }
    }

    None
}

/// Extracts the target path from a `[download] Destination: ...` line.
pub fn parse_destination(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("[download] Destination:")?;
    let path = rest.trim();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Parses a size token like "10.00MiB" or "500.00KiB", with or without "/s".
fn parse_size(size_str: &str) -> Option<u64> {
    let size_str = size_str.trim_start_matches('~').trim_end_matches("/s");
    if size_str.ends_with("GiB") {
        if let Ok(gb) = size_str.trim_end_matches("GiB").parse::<f64>() {
            return Some((gb * 1024.0 * 1024.0 * 1024.0) as u64);
        }
    } else if size_str.ends_with("MiB") {
        if let Ok(mb) = size_str.trim_end_matches("MiB").parse::<f64>() {
            return Some((mb * 1024.0 * 1024.0) as u64);
        }
    } else if size_str.ends_with("KiB") {
        if let Ok(kb) = size_str.trim_end_matches("KiB").parse::<f64>() {
            return Some((kb * 1024.0) as u64);
        }
    } else if size_str.ends_with('B') {
        if let Ok(b) = size_str.trim_end_matches('B').parse::<f64>() {
            return Some(b as u64);
        }
    }
    None
}

/// Parses an ETA token like "00:10", "1:23" or "1:02:03".
fn parse_eta(eta_str: &str) -> Option<u64> {
    let parts: Vec<&str> = eta_str.split(':').collect();
    match parts.len() {
        2 => {
            if let (Ok(minutes), Ok(seconds)) = (parts[0].parse::<u64>(), parts[1].parse::<u64>()) {
                return Some(minutes * 60 + seconds);
            }
            None
        }
        3 => {
            if let (Ok(hours), Ok(minutes), Ok(seconds)) = (
                parts[0].parse::<u64>(),
                parts[1].parse::<u64>(),
                parts[2].parse::<u64>(),
            ) {
                return Some(hours * 3600 + minutes * 60 + seconds);
            }
            None
        }
        _ => None,
    }
}
