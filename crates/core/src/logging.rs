//! Category logging for the session engine.
//!
//! - **LogConfig**: process-global configuration with atomic per-category levels
//! - **LogLevel**: Off < Error < Warn < Info < Debug < Trace
//! - **LogCategory**: cartridge staging, session lifecycle, frame stepping,
//!   input, save states and battery memory
//! - **log()**: single entry point; the message closure only runs when the
//!   category is enabled
//!
//! Output goes to stderr, or to a file through a background writer thread so
//! a frame step never blocks on disk I/O. Each category is rate limited to a
//! fixed number of messages per second; dropped messages are summarised.
//!
//! ```rust
//! use emu_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Snapshot, LogLevel::Debug, || {
//!     format!("state written: {} bytes", 1234)
//! });
//! ```

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from a name or digit (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// What part of the session a message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// ROM staging, header parsing, region detection
    Cartridge,
    /// Load/unload/reset and option changes
    Session,
    /// Frame stepping
    Frame,
    /// Controller input
    Input,
    /// Save state capture and restore
    Snapshot,
    /// Battery-backed memory
    Sram,
}

const CATEGORY_COUNT: usize = 6;

impl LogCategory {
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::Cartridge,
        LogCategory::Session,
        LogCategory::Frame,
        LogCategory::Input,
        LogCategory::Snapshot,
        LogCategory::Sram,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while logging must not disable logging for everyone else.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct CategoryWindow {
    recent: VecDeque<Instant>,
    dropped: usize,
    last_report: Option<Instant>,
}

/// Sliding one-second window per category.
struct RateLimiter {
    max_per_second: AtomicUsize,
    windows: Mutex<[CategoryWindow; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: AtomicUsize::new(max_per_second),
            windows: Mutex::new(Default::default()),
        }
    }

    /// Returns whether the message may be written, and a drop count to report
    /// if one is due.
    fn admit(&self, category: LogCategory) -> (bool, Option<usize>) {
        let now = Instant::now();
        let window_len = Duration::from_secs(1);
        let max = self.max_per_second.load(Ordering::Relaxed);

        let mut windows = lock(&self.windows);
        let w = &mut windows[category.index()];
        while w
            .recent
            .front()
            .is_some_and(|&t| now.duration_since(t) > window_len)
        {
            w.recent.pop_front();
        }

        let allowed = w.recent.len() < max;
        if allowed {
            w.recent.push_back(now);
        } else {
            w.dropped += 1;
        }

        let report_due = w.dropped > 0
            && (allowed
                || w
                    .last_report
                    .map_or(true, |last| now.duration_since(last) >= window_len));
        if report_due {
            let dropped = std::mem::take(&mut w.dropped);
            w.last_report = Some(now);
            (allowed, Some(dropped))
        } else {
            (allowed, None)
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    global_level: AtomicU8,
    levels: [AtomicU8; CATEGORY_COUNT],
    file_sender: Mutex<Option<Sender<String>>>,
    file_enabled: AtomicBool,
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// Everything off, 60 messages per second per category
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            levels: Default::default(),
            file_sender: Mutex::new(None),
            file_enabled: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(60),
        }
    }

    /// The process-wide instance
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category with its own level uses it; otherwise the global level applies.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        match self.get_level(category) {
            LogLevel::Off => level <= self.get_global_level(),
            own => level <= own,
        }
    }

    /// Reset all levels to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    pub fn set_rate_limit(&self, max_per_second: usize) {
        self.rate_limiter
            .max_per_second
            .store(max_per_second, Ordering::Relaxed);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.rate_limiter.max_per_second.load(Ordering::Relaxed)
    }

    /// Send output to a file (appending). A writer thread owns the file; a
    /// previously configured file is closed once its queue drains.
    pub fn set_log_file(&self, path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::<String>();

        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                while let Ok(line) = receiver.recv() {
                    let _ = writeln!(file, "{}", line);
                    let _ = file.flush();
                }
            })?;

        *lock(&self.file_sender) = Some(sender);
        self.file_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Go back to stderr output
    pub fn clear_log_file(&self) {
        *lock(&self.file_sender) = None;
        self.file_enabled.store(false, Ordering::Relaxed);
    }

    fn write_message(&self, message: String) {
        if self.file_enabled.load(Ordering::Relaxed) {
            if let Some(sender) = lock(&self.file_sender).as_ref() {
                match sender.send(message) {
                    Ok(()) => return,
                    Err(failed) => {
                        eprintln!("{}", failed.0);
                        return;
                    }
                }
            }
        }
        eprintln!("{}", message);
    }
}

/// Log a message for `category` at `level`.
///
/// `message_fn` is only called when the category is enabled at that level and
/// the category's rate limit has room.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let (allowed, dropped) = config.rate_limiter.admit(category);
    if let Some(count) = dropped.filter(|&n| n > 0) {
        config.write_message(format!(
            "[{:?}] rate limit exceeded, {} message(s) dropped",
            category, count
        ));
    }
    if allowed {
        config.write_message(format!("[{:?}] {}", category, message_fn()));
    }
}
