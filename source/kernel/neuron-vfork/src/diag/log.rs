// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Minimal structured logging with severity levels
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (line format) + tests/vfork_flow.rs (sink capture)
//! PUBLIC API: log_* macros, emit(level,target,args), set_sink, write_line
//! DEPENDS_ON: spin::Mutex (sink slot)
//! INVARIANTS: Debug/Trace only in debug builds; single-line emission; no sink => dropped

use core::fmt::{Arguments, Write};

use spin::Mutex;

/// Logging severity used by the kernel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    pub const fn tag(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    pub const fn enabled(self) -> bool {
        match self {
            Level::Debug | Level::Trace => cfg!(debug_assertions),
            _ => true,
        }
    }
}

/// Output backend: the board's console writer, or a capture hook in tests.
pub type Sink = fn(Level, &'static str, Arguments<'_>);

static SINK: Mutex<Option<Sink>> = Mutex::new(None);

/// Installs the output backend, returning the previous one.
pub fn set_sink(sink: Option<Sink>) -> Option<Sink> {
    core::mem::replace(&mut *SINK.lock(), sink)
}

/// Formats one line as `[LEVEL target] message\n`.
pub fn write_line<W: Write>(
    out: &mut W,
    level: Level,
    target: &str,
    args: Arguments<'_>,
) -> core::fmt::Result {
    out.write_fmt(format_args!("[{} {}] ", level.tag(), target))?;
    out.write_fmt(args)?;
    out.write_char('\n')
}

/// Emits a structured log line if the level is enabled for the current build.
pub fn emit(level: Level, target: &'static str, args: Arguments<'_>) {
    if !level.enabled() {
        return;
    }
    // Copy out so a sink that logs cannot deadlock on the slot.
    let sink = *SINK.lock();
    if let Some(sink) = sink {
        sink(level, target, args);
    }
}

#[macro_export]
macro_rules! log_error {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Error, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Error, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_warn {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Warn, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Warn, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_info {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Info, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Info, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_debug {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Debug, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Debug, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_trace {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Trace, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Trace, module_path!(), format_args!($($arg)+));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_format_is_single_line() {
        let mut out = String::new();
        write_line(&mut out, Level::Warn, "vfork", format_args!("used={}", 64)).unwrap();
        assert_eq!(out, "[WARN vfork] used=64\n");
    }

    #[test]
    fn error_is_always_enabled() {
        assert!(Level::Error.enabled());
        assert!(Level::Warn.enabled());
        assert_eq!(Level::Trace.enabled(), cfg!(debug_assertions));
    }

    #[test]
    fn emit_never_blocks() {
        emit(Level::Info, "test", format_args!("dropped"));
    }
}
