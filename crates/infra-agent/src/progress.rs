//! Terminal feedback: a spinner for model and tool waits, and status lines

use std::io::{stdout, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;

const CLEAR_LINE: &str = "\x1b[2K\r";
const HIDE_CURSOR: &str = "\x1b[?25l";
const SHOW_CURSOR: &str = "\x1b[?25h";
const CYAN: &str = "\x1b[96m";
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const RED: &str = "\x1b[91m";
const RESET: &str = "\x1b[0m";

const UNICODE_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const ASCII_FRAMES: &[&str] = &["|", "/", "-", "\\"];

/// Status glyphs, Unicode first
#[derive(Debug, Clone, Copy)]
enum Glyph {
    Ok,
    Warn,
    Fail,
}

impl Glyph {
    fn render(self, unicode: bool) -> &'static str {
        match (self, unicode) {
            (Glyph::Ok, true) => "✓",
            (Glyph::Ok, false) => "+",
            (Glyph::Warn, true) => "⚠",
            (Glyph::Warn, false) => "!",
            (Glyph::Fail, true) => "✗",
            (Glyph::Fail, false) => "x",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Glyph::Ok => GREEN,
            Glyph::Warn => YELLOW,
            Glyph::Fail => RED,
        }
    }
}

/// Animated spinner shown while waiting on the model or a tool.
///
/// Draws nothing when stdout is not a terminal so piped output stays clean.
pub struct Spinner {
    message: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    unicode: bool,
    enabled: bool,
}

impl Spinner {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            unicode: supports_unicode(),
            enabled: stdout().is_terminal(),
        }
    }

    pub fn start(&mut self) {
        if !self.enabled || self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let running = self.running.clone();
        let message = self.message.clone();
        let frames = if self.unicode { UNICODE_FRAMES } else { ASCII_FRAMES };

        self.handle = Some(tokio::spawn(async move {
            let mut tick = interval(Duration::from_millis(80));
            print!("{}", HIDE_CURSOR);

            for frame in frames.iter().cycle() {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                print!("{}{}{} {}{}", CLEAR_LINE, CYAN, frame, message, RESET);
                let _ = stdout().flush();
                tick.tick().await;
            }

            print!("{}{}", CLEAR_LINE, SHOW_CURSOR);
            let _ = stdout().flush();
        }));
    }

    /// Stop and clear the spinner line
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub async fn stop_with_success(&mut self, message: impl Into<String>) {
        self.stop().await;
        print_glyph(Glyph::Ok, self.unicode, &message.into());
    }

    pub async fn stop_with_error(&mut self, message: impl Into<String>) {
        self.stop().await;
        print_glyph(Glyph::Fail, self.unicode, &message.into());
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            if self.enabled {
                print!("{}{}", CLEAR_LINE, SHOW_CURSOR);
                let _ = stdout().flush();
            }
        }
    }
}

/// One-line status reports for the CLI commands
#[derive(Debug, Clone, Copy)]
pub struct StatusLine {
    unicode: bool,
}

impl StatusLine {
    pub fn new() -> Self {
        Self {
            unicode: supports_unicode(),
        }
    }

    /// Print a pass/fail check line
    pub fn check(&self, ok: bool, message: impl AsRef<str>) {
        let glyph = if ok { Glyph::Ok } else { Glyph::Fail };
        print_glyph(glyph, self.unicode, message.as_ref());
    }

    pub fn success(&self, message: impl AsRef<str>) {
        print_glyph(Glyph::Ok, self.unicode, message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        print_glyph(Glyph::Warn, self.unicode, message.as_ref());
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}

fn print_glyph(glyph: Glyph, unicode: bool, message: &str) {
    println!("{}{}{} {}", glyph.color(), glyph.render(unicode), RESET, message);
}

/// Whether the terminal likely renders Unicode glyphs
fn supports_unicode() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term.contains("xterm") || term.contains("256color") || term.contains("kitty") {
            return true;
        }
    }
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .any(|val| val.to_lowercase().contains("utf"))
}
