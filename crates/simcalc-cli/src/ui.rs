//! UI helpers for CLI display.

use console::style;

use simcalc_core::status::StatusKind;

/// Check if color output is disabled via `NO_COLOR` env var.
#[must_use]
pub fn is_color_disabled() -> bool {
    std::env::var("NO_COLOR").is_ok()
}

/// Print a styled header.
pub fn print_header(text: &str) {
    if is_color_disabled() {
        println!("=== {text} ===");
    } else {
        println!("{}", style(format!("=== {text} ===")).bold().cyan());
    }
}

/// Print an error message.
pub fn print_error(text: &str) {
    if is_color_disabled() {
        eprintln!("[ERROR] {text}");
    } else {
        eprintln!("{} {text}", style("[ERROR]").red().bold());
    }
}

/// Fixed-width label for a status, colored unless `NO_COLOR` is set.
#[must_use]
pub fn status_label(kind: StatusKind) -> String {
    let text = match kind {
        StatusKind::Computing => "COMPUTING",
        StatusKind::Ok => "OK",
        StatusKind::Error => "ERROR",
    };
    let padded = format!("{text:<9}");
    if is_color_disabled() {
        return padded;
    }
    match kind {
        StatusKind::Computing => style(padded).yellow().to_string(),
        StatusKind::Ok => style(padded).green().bold().to_string(),
        StatusKind::Error => style(padded).red().bold().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_functions_do_not_panic() {
        print_header("Report r-1");
        print_error("Simulation sim-2 failed");
    }

    #[test]
    fn status_label_contains_text() {
        assert!(status_label(StatusKind::Ok).contains("OK"));
        assert!(status_label(StatusKind::Error).contains("ERROR"));
        assert!(status_label(StatusKind::Computing).contains("COMPUTING"));
    }
}
