//! Progress parsing and write throttling

use std::time::{Duration, Instant};

/// One parsed yt-dlp progress line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YtDlpProgress {
    pub percent: f64,
    pub speed_bps: f64,
    pub total_bytes: u64,
}

impl YtDlpProgress {
    /// Whole percent, clamped to 0..=100
    pub fn whole_percent(&self) -> u8 {
        self.percent.clamp(0.0, 100.0).floor() as u8
    }
}

/// Parse a progress line such as
/// `[download]  42.5% of ~ 150.00MiB at  5.20MiB/s ETA 00:15`
pub fn parse_yt_dlp_progress(line: &str) -> Option<YtDlpProgress> {
    if !line.trim_start().starts_with("[download]") || !line.contains('%') {
        return None;
    }

    let pct_pos = line.find('%')?;
    let before = &line[..pct_pos];
    let num_start = before
        .char_indices()
        .rev()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let percent = before[num_start..].parse::<f64>().ok()?;

    let total_bytes = line
        .find(" of ")
        .map(|idx| {
            let after_of = line[idx + 4..].trim_start().trim_start_matches('~').trim_start();
            let end = after_of.find(' ').unwrap_or(after_of.len());
            parse_size(&after_of[..end]) as u64
        })
        .unwrap_or(0);

    let speed_bps = line
        .find(" at ")
        .and_then(|idx| {
            let after = line[idx + 4..].trim_start();
            after.find("/s").map(|end| parse_size(&after[..end]))
        })
        .unwrap_or(0.0);

    Some(YtDlpProgress {
        percent,
        speed_bps,
        total_bytes,
    })
}

/// Parse `150.00MiB`, `512KiB`, `1.2GiB` or plain bytes
fn parse_size(token: &str) -> f64 {
    let token = token.trim();
    let split = token
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(token.len());
    let Ok(num) = token[..split].parse::<f64>() else {
        return 0.0;
    };
    let multiplier = match token[split..].trim() {
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "KB" => 1000.0,
        "MB" => 1000.0 * 1000.0,
        "GB" => 1000.0 * 1000.0 * 1000.0,
        _ => 1.0,
    };
    num * multiplier
}

/// Limits how often progress is written to the store.
///
/// The final 100% update is always let through.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_write: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_write: None,
        }
    }

    /// Returns true if a write of `percent` should happen now, and records it
    pub fn should_write(&mut self, percent: u8) -> bool {
        let now = Instant::now();
        let due = percent >= 100
            || self
                .last_write
                .map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            self.last_write = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_progress_line() {
        let progress =
            parse_yt_dlp_progress("[download]  42.5% of ~ 150.00MiB at  5.20MiB/s ETA 00:15")
                .unwrap();
        assert_eq!(progress.percent, 42.5);
        assert_eq!(progress.whole_percent(), 42);
        assert_eq!(progress.total_bytes, (150.0 * 1024.0 * 1024.0) as u64);
        assert!((progress.speed_bps - 5.2 * 1024.0 * 1024.0).abs() < 1.0);
    }

    #[test]
    fn test_parse_finished_line() {
        let progress = parse_yt_dlp_progress("[download] 100% of   10.00KiB in 00:00:01").unwrap();
        assert_eq!(progress.whole_percent(), 100);
        assert_eq!(progress.total_bytes, 10 * 1024);
        assert_eq!(progress.speed_bps, 0.0);
    }

    #[test]
    fn test_ignore_non_progress_lines() {
        assert!(parse_yt_dlp_progress("[youtube] dQw4w9WgXcQ: Downloading webpage").is_none());
        assert!(parse_yt_dlp_progress("[download] Destination: video.mp4").is_none());
        assert!(parse_yt_dlp_progress("/home/user/Downloads/video 100%.mp4").is_none());
    }

    #[test]
    fn test_throttle_lets_first_and_final_writes_through() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_write(1));
        assert!(!throttle.should_write(2));
        assert!(!throttle.should_write(99));
        assert!(throttle.should_write(100));
    }

    #[test]
    fn test_zero_interval_never_throttles() {
        let mut throttle = ProgressThrottle::new(Duration::ZERO);
        assert!(throttle.should_write(1));
        assert!(throttle.should_write(2));
    }
}
