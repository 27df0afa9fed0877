//! Leveled, colored diagnostic output.
//!
//! Mirrors the teacher's `infoln!`/`errorln!`-style macros, generalized
//! from a single verbose/quiet flag into a proper level so the CLI's
//! `-v`/`-q` flags (spec section 6, "Logger verbosity level") have
//! somewhere to land.

use std::cell::RefCell;
use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicU8, Ordering};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

static LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

/// Set the global log level. Not thread-safe against concurrent readers
/// mid-print, but evaluation is single-threaded (spec section 5), so this
/// is only ever called once, before any directory is processed.
pub fn set_level(level: Level) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn enabled(level: Level) -> bool {
    (level as u8) <= LEVEL.load(Ordering::Relaxed)
}

thread_local! {
    static STDERR: RefCell<StandardStream> = RefCell::new(make_stderr());
}

fn make_stderr() -> StandardStream {
    let color_choice = if std::io::stderr().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stderr(color_choice)
}

pub(crate) fn print_tag(color_spec: &ColorSpec, tag: &str) {
    STDERR.with_borrow_mut(|stderr| {
        let _ = stderr.set_color(color_spec);
        let _ = write!(stderr, "{:>7}", tag);
        let _ = stderr.reset();
        eprint!(" ");
    });
}

pub fn error_color() -> ColorSpec {
    let mut c = ColorSpec::new();
    c.set_fg(Some(Color::Red)).set_bold(true);
    c
}

pub fn warn_color() -> ColorSpec {
    let mut c = ColorSpec::new();
    c.set_fg(Some(Color::Yellow)).set_bold(true);
    c
}

pub fn info_color() -> ColorSpec {
    let mut c = ColorSpec::new();
    c.set_fg(Some(Color::Green)).set_bold(true);
    c
}

pub fn debug_color() -> ColorSpec {
    let mut c = ColorSpec::new();
    c.set_fg(Some(Color::Cyan));
    c
}

pub fn trace_color() -> ColorSpec {
    let mut c = ColorSpec::new();
    c.set_fg(Some(Color::Blue));
    c
}

macro_rules! errorln {
    ($($args:tt)*) => {{
        if $crate::system::enabled($crate::system::Level::Error) {
            $crate::system::print_tag(&$crate::system::error_color(), "error");
            eprintln!($($args)*);
        }
    }};
}
pub(crate) use errorln;

macro_rules! warnln {
    ($($args:tt)*) => {{
        if $crate::system::enabled($crate::system::Level::Warn) {
            $crate::system::print_tag(&$crate::system::warn_color(), "warn");
            eprintln!($($args)*);
        }
    }};
}
pub(crate) use warnln;

macro_rules! infoln {
    ($($args:tt)*) => {{
        if $crate::system::enabled($crate::system::Level::Info) {
            $crate::system::print_tag(&$crate::system::info_color(), "info");
            eprintln!($($args)*);
        }
    }};
}
pub(crate) use infoln;

macro_rules! debugln {
    ($($args:tt)*) => {{
        if $crate::system::enabled($crate::system::Level::Debug) {
            $crate::system::print_tag(&$crate::system::debug_color(), "debug");
            eprintln!($($args)*);
        }
    }};
}
pub(crate) use debugln;

macro_rules! traceln {
    ($($args:tt)*) => {{
        if $crate::system::enabled($crate::system::Level::Trace) {
            $crate::system::print_tag(&$crate::system::trace_color(), "trace");
            eprintln!($($args)*);
        }
    }};
}
pub(crate) use traceln;
