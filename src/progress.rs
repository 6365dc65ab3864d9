/// Marker prefixed to the progress lines yt-dlp prints for us.
pub const PROGRESS_MARKER: &str = "[progress]";

/// Value for yt-dlp's `--progress-template`.
pub fn progress_template() -> String {
    format!("download:{PROGRESS_MARKER} %(progress._percent_str)s")
}

/// Extracts the completed fraction (0.0..=1.0) from a templated progress line.
pub fn parse_progress(line: &str) -> Option<f32> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let number = rest.trim().strip_suffix('%')?;
    let value = number.trim().parse::<f32>().ok()?;
    Some((value / 100.0).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_padded_percentages() {
        assert_eq!(parse_progress("[progress]  42.5%"), Some(0.425));
        assert_eq!(parse_progress("[progress] 100.0%\r"), Some(1.0));
    }

    #[test]
    fn ignores_other_output() {
        assert_eq!(parse_progress("[download] Destination: a.mp4"), None);
        assert_eq!(parse_progress("[progress]   N/A"), None);
    }

    #[test]
    fn template_emits_marker() {
        assert!(progress_template().contains(PROGRESS_MARKER));
    }
}
