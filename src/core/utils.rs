use crate::core::config;

/// Sanitizes a display filename for the output folder.
///
/// Keeps ASCII alphanumeric characters, spaces, and `. - _ ( )`;
/// every other character is replaced with `_`. This is stricter than
/// most filesystems require, but the result survives any of them.
///
/// # Example
///
/// ```
/// use vidra::core::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("Artist - Title (live).mp3"), "Artist - Title (live).mp3");
/// assert_eq!(sanitize_filename("a/b:c*d.mp4"), "a_b_c_d.mp4");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Builds the final display filename for a completed download.
///
/// The title portion is truncated to `MAX_TITLE_LENGTH` characters before the
/// extension is appended, then the whole name is sanitized.
///
/// # Example
///
/// ```
/// use vidra::core::utils::sanitize_title;
///
/// assert_eq!(sanitize_title("My Song", ".mp3"), "My Song.mp3");
/// ```
pub fn sanitize_title(title: &str, extension: &str) -> String {
    let truncated: String = title.chars().take(config::validation::MAX_TITLE_LENGTH).collect();
    sanitize_filename(&format!("{}{}", truncated, extension))
}

/// Formats a download speed in bytes/second for display.
///
/// Uses base-1024 thresholds, one decimal place for KB/MB.
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= 1024.0 * 1024.0 {
        format!("{:.1} MB/s", bytes_per_sec / 1024.0 / 1024.0)
    } else if bytes_per_sec >= 1024.0 {
        format!("{:.1} KB/s", bytes_per_sec / 1024.0)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}

/// Formats an ETA in seconds as `M:SS` with zero-padded seconds.
pub fn format_eta(eta_seconds: u64) -> String {
    let mins = eta_seconds / 60;
    let secs = eta_seconds % 60;
    format!("{}:{:02}", mins, secs)
}

/// Format a duration in seconds as M:SS or H:MM:SS.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Expands a configured path (handles ~ for the home directory).
pub fn expand_path(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Sanitization Tests ====================

    #[test]
    fn test_sanitize_filename_keeps_allowed_chars() {
        assert_eq!(
            sanitize_filename("Track 01. Name - (remix)_final.mp3"),
            "Track 01. Name - (remix)_final.mp3"
        );
    }

    #[test]
    fn test_sanitize_filename_replaces_everything_else() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j.mp4"), "a_b_c_d_e_f_g_h_i_j.mp4");
        assert_eq!(sanitize_filename("тест видео.mp4"), "____ _____.mp4");
    }

    #[test]
    fn test_sanitize_filename_charset_property() {
        let sanitized = sanitize_filename("weird🎵name/with\tstuff.webm");
        assert!(sanitized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_' | '(' | ')')));
    }

    #[test]
    fn test_sanitize_title_truncates_long_titles() {
        let long_title = "x".repeat(120);
        let name = sanitize_title(&long_title, ".mp4");
        assert_eq!(name, format!("{}.mp4", "x".repeat(50)));
        assert!(name.trim_end_matches(".mp4").len() <= 50);
    }

    #[test]
    fn test_sanitize_title_short_title_untouched() {
        assert_eq!(sanitize_title("Short", ".mp3"), "Short.mp3");
    }

    // ==================== Formatting Tests ====================

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(500.0), "500 B/s");
        assert_eq!(format_speed(2048.0), "2.0 KB/s");
        assert_eq!(format_speed(5.0 * 1024.0 * 1024.0), "5.0 MB/s");
    }

    #[test]
    fn test_format_speed_boundaries() {
        assert_eq!(format_speed(1023.0), "1023 B/s");
        assert_eq!(format_speed(1024.0), "1.0 KB/s");
        assert_eq!(format_speed(1024.0 * 1024.0), "1.0 MB/s");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(10), "0:10");
        assert_eq!(format_eta(65), "1:05");
        assert_eq!(format_eta(600), "10:00");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3661), "1:01:01");
        assert_eq!(format_duration(30), "0:30");
    }
}
