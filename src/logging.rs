//! Text output: `print!`/`println!` to the serial console and a `log`
//! facade implementation emitting `[LEVEL] target | message` lines.

use core::fmt;

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::arch::serial;

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::logging::print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

pub fn print(args: fmt::Arguments) {
    serial::putfmt(args);
}

struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        println!("[{}] {} | {}", level, record.target(), record.args());
    }

    fn flush(&self) {}
}

/// Install the logger. The max level is fixed at build time via the `LOG`
/// environment variable (debug, info, warn, err).
pub fn init() {
    log::set_logger(&LOGGER).expect("logger already installed");
    log::set_max_level(match option_env!("LOG") {
        Some("err") | Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    });
}
