//! Terminal color support for CLI output.
//!
//! Styling is applied only when the target stream is a terminal, so piped
//! or redirected output stays plain text.

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

/// Pad a string to a minimum width (left-aligned), then apply a color function.
/// Padding happens first so ANSI escape codes do not count toward the width.
pub fn pad_left<F>(msg: &str, width: usize, color_fn: F) -> String
where
    F: FnOnce(&str) -> String,
{
    color_fn(&format!("{:<width$}", msg))
}

fn stdout_is_tty() -> bool {
    std::io::stdout().is_terminal()
}

fn stderr_is_tty() -> bool {
    std::io::stderr().is_terminal()
}

/// Apply `style` to stdout text when stdout is a terminal.
fn paint<F>(msg: &str, style: F) -> String
where
    F: FnOnce(&str) -> String,
{
    if stdout_is_tty() {
        style(msg)
    } else {
        msg.to_string()
    }
}

/// Prefix a stderr diagnostic with a label, colored on a terminal.
fn label(kind: &str, msg: &str, style: fn(&str) -> String) -> String {
    let prefix = format!("{}:", kind);
    if stderr_is_tty() {
        format!("{} {}", style(&prefix), msg)
    } else {
        format!("{} {}", prefix, msg)
    }
}

pub fn error(msg: &str) -> String {
    label("error", msg, |s| s.red().bold().to_string())
}

pub fn warning(msg: &str) -> String {
    label("warning", msg, |s| s.yellow().bold().to_string())
}

pub fn success(msg: &str) -> String {
    paint(msg, |s| s.green().to_string())
}

pub fn info(msg: &str) -> String {
    paint(msg, |s| s.cyan().to_string())
}

/// Secondary text such as field labels.
pub fn dim(msg: &str) -> String {
    paint(msg, |s| s.dimmed().to_string())
}

pub fn bold(msg: &str) -> String {
    paint(msg, |s| s.bold().to_string())
}

/// Section headings in summaries.
pub fn header(msg: &str) -> String {
    paint(msg, |s| s.bold().blue().to_string())
}

pub fn path(msg: &str) -> String {
    paint(msg, |s| s.underline().to_string())
}

/// Counts and timecodes.
pub fn number(msg: &str) -> String {
    paint(msg, |s| s.cyan().to_string())
}

pub fn yes() -> String {
    paint("yes", |s| s.green().to_string())
}

pub fn no() -> String {
    paint("no", |s| s.dimmed().to_string())
}

/// Session state name, colored by how far along the lifecycle it is.
pub fn state(state: &str) -> String {
    match state {
        "idle" => dim(state),
        "initializing" | "stopping" => paint(state, |s| s.yellow().to_string()),
        "active" => paint(state, |s| s.green().bold().to_string()),
        _ => state.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_left_pads_before_styling() {
        let padded = pad_left("ID", 6, |s| format!("[{}]", s));
        assert_eq!(padded, "[ID    ]");
    }

    #[test]
    fn test_plain_when_not_a_terminal() {
        // Test harness output is captured, never a terminal.
        if !stdout_is_tty() {
            assert_eq!(success("done"), "done");
            assert_eq!(state("active"), "active");
        }
        if !stderr_is_tty() {
            assert_eq!(error("boom"), "error: boom");
        }
    }
}
