//! CLI output formatting.

use std::io::{self, Write};
use std::time::Duration;

use serde_json::Value;

/// Format a JSON value for display, truncating long compact output.
#[must_use]
pub fn format_json(value: &Value, verbose: bool) -> String {
    if verbose {
        return serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    }
    let s = value.to_string();
    let chars = s.chars().count();
    if chars > 200 {
        let head: String = s.chars().take(100).collect();
        let tail: String = s.chars().skip(chars - 60).collect();
        format!("{head}...{tail} ({chars} chars)")
    } else {
        s
    }
}

/// Format a duration for display.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let mins = (secs / 60.0).floor() as u64;
        let remaining = secs - (mins as f64 * 60.0);
        format!("{mins}m{remaining:.0}s")
    }
}

/// Format a percentage with one decimal, dropping a trailing `.0`.
#[must_use]
pub fn format_progress(progress: f64) -> String {
    let s = format!("{progress:.1}");
    match s.strip_suffix(".0") {
        Some(whole) => format!("{whole}%"),
        None => format!("{s}%"),
    }
}

/// Write a JSON result to a file, pretty-printed.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be created or written.
pub fn write_to_file(path: &str, value: &Value) -> io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(&mut file, value).map_err(io::Error::other)?;
    writeln!(file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn format_duration_ranges() {
        assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
        assert_eq!(format_duration(Duration::from_millis(37_500)), "37.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
    }

    #[test]
    fn format_progress_trims_whole_numbers() {
        assert_eq!(format_progress(95.0), "95%");
        assert_eq!(format_progress(47.5), "47.5%");
        assert_eq!(format_progress(0.0), "0%");
    }

    #[test]
    fn format_json_short_is_compact() {
        assert_eq!(format_json(&json!({"a": 1}), false), r#"{"a":1}"#);
    }

    #[test]
    fn format_json_long_is_truncated() {
        let long = json!({"text": "x".repeat(500)});
        let s = format_json(&long, false);
        assert!(s.contains("..."));
        assert!(s.ends_with("chars)"));
    }

    #[test]
    fn format_json_verbose_is_pretty() {
        let s = format_json(&json!({"a": {"b": 2}}), true);
        assert!(s.contains('\n'));
    }

    #[test]
    fn write_to_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let path = path.to_str().unwrap();
        write_to_file(path, &json!({"sim-a": {"y": 2}})).unwrap();
        let back: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, json!({"sim-a": {"y": 2}}));
    }
}
