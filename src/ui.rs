//! Console output
//!
//! All user-facing progress goes through [`Console`]. Whether to color and
//! whether to show debug detail are properties of the value passed around,
//! not process-wide switches.

use std::io::IsTerminal;
use std::time::Duration;

use colored::{ColoredString, Colorize};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const THIN_RULE: &str = "────────────────────────────────────────────────────────────";

/// Rendering configuration for progress output
#[derive(Debug, Clone, Copy)]
pub struct Console {
    pub color: bool,
    pub debug: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::detect(false)
    }
}

impl Console {
    pub fn new(color: bool, debug: bool) -> Self {
        Self { color, debug }
    }

    /// Color when stdout is a terminal and `NO_COLOR` is unset
    pub fn detect(debug: bool) -> Self {
        let color = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self { color, debug }
    }

    /// A console that never colors, for tests and piped output
    pub fn plain() -> Self {
        Self {
            color: false,
            debug: false,
        }
    }

    /// Apply a style if coloring is enabled
    pub fn paint(&self, text: &str, style: impl Fn(&str) -> ColoredString) -> String {
        if self.color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn ok(&self) -> String {
        self.paint("✓", |s| s.green())
    }

    pub fn fail(&self) -> String {
        self.paint("✗", |s| s.red())
    }

    pub fn skip(&self) -> String {
        self.paint("⊘", |s| s.yellow())
    }

    pub fn success(&self, message: &str) {
        println!("{}", self.paint(message, |s| s.green().bold()));
    }

    pub fn failure(&self, message: &str) {
        println!("{}", self.paint(message, |s| s.red().bold()));
    }

    pub fn warning(&self, message: &str) {
        println!("{}", self.paint(message, |s| s.yellow()));
    }

    pub fn info(&self, message: &str) {
        println!("{}", self.paint(message, |s| s.cyan()));
    }

    /// Printed only in debug mode
    pub fn debug(&self, message: &str) {
        if self.debug {
            println!("{}", self.paint(&format!("[DEBUG] {}", message), |s| s.magenta()));
        }
    }

    /// Errors go to stderr
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.fail(), self.paint(message, |s| s.red().bold()));
    }

    pub fn dimmed(&self, message: &str) {
        println!("{}", self.paint(message, |s| s.dimmed()));
    }

    pub fn blank(&self) {
        println!();
    }

    /// `Running flow: <name>` banner
    pub fn flow_header(&self, name: &str, description: Option<&str>) {
        println!(
            "{} {}",
            self.paint("Running flow:", |s| s.cyan()),
            self.paint(name, |s| s.white().bold())
        );
        if let Some(desc) = description {
            self.dimmed(&format!("  {}", desc));
        }
        println!();
    }

    /// `Step n/m: name ` prefix, completed by [`Console::step_ok`] or
    /// [`Console::step_fail`]
    pub fn step_start(&self, number: usize, total: usize, name: &str) {
        print!(
            "{} ",
            self.paint(&format!("Step {}/{}: {}", number, total, name), |s| s.blue().bold())
        );
        if self.debug {
            println!();
        }
    }

    pub fn step_ok(&self, duration: Duration) {
        println!("{} ({})", self.ok(), format_duration(duration));
    }

    pub fn step_fail(&self, duration: Duration) {
        println!("{} ({})", self.fail(), format_duration(duration));
    }

    pub fn step_skipped(&self, number: usize, total: usize, name: &str, reason: &str) {
        println!(
            "{} {} {}",
            self.paint(&format!("Step {}/{}: {}", number, total, name), |s| s.blue().bold()),
            self.skip(),
            self.paint(&format!("(skipped: {})", reason), |s| s.dimmed())
        );
    }

    /// Banner printed around a failed terraform command
    pub fn command_failure(&self, command: &str, working_dir: &str, exit_code: i32, output: &str) {
        println!();
        println!("{}", self.paint(RULE, |s| s.red().bold()));
        println!("{}", self.paint("  ✗ TERRAFORM COMMAND FAILED", |s| s.red().bold()));
        println!("{}", self.paint(RULE, |s| s.red().bold()));
        println!("{} {}", self.paint("Command:", |s| s.yellow()), self.paint(command, |s| s.white().bold()));
        println!("{} {}", self.paint("Working Directory:", |s| s.yellow()), working_dir);
        println!(
            "{} {}",
            self.paint("Exit Code:", |s| s.yellow()),
            self.paint(&exit_code.to_string(), |s| s.red().bold())
        );
        println!();
        println!("{}", self.paint("Full Output (stdout + stderr):", |s| s.red().bold()));
        println!("{}", self.paint(THIN_RULE, |s| s.bright_black()));
        for line in output.lines() {
            println!("{}", self.highlight_line(line));
        }
        println!("{}", self.paint(THIN_RULE, |s| s.bright_black()));
        println!();
    }

    /// Print suggested fixes, each a title followed by indented hints
    pub fn suggestions(&self, suggestions: &[(String, Vec<String>)]) {
        println!("{}", self.paint("💡 Suggested Fixes:", |s| s.cyan().bold()));
        println!();
        for (title, hints) in suggestions {
            println!("{}", self.paint(&format!("  → {}", title), |s| s.yellow()));
            for hint in hints {
                println!("     {}", hint);
            }
            println!();
        }
        println!("{}", self.paint(THIN_RULE, |s| s.bright_black()));
        println!();
    }

    /// Color a line of tool output by the words it contains
    fn highlight_line(&self, line: &str) -> String {
        let lower = line.to_lowercase();
        if ["error", "failed", "failure"].iter().any(|w| lower.contains(w)) {
            self.paint(line, |s| s.red())
        } else if ["warning", "deprecated"].iter().any(|w| lower.contains(w)) {
            self.paint(line, |s| s.yellow())
        } else if ["success", "complete", "created", "updated"].iter().any(|w| lower.contains(w)) {
            self.paint(line, |s| s.green())
        } else {
            line.to_string()
        }
    }
}

/// Short human-readable duration: `850ms`, `2.3s`, `1m5s`
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        let secs = d.as_secs();
        format!("{}m{}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_console_never_colors() {
        let console = Console::plain();
        assert_eq!(console.paint("hello", |s| s.red().bold()), "hello");
        assert_eq!(console.ok(), "✓");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(2300)), "2.3s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m5s");
    }

    #[test]
    fn test_highlight_plain_passthrough() {
        let console = Console::plain();
        assert_eq!(console.highlight_line("Error: boom"), "Error: boom");
    }
}
