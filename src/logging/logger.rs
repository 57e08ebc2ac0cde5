// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global logger singleton.
//!
//! Lazily initialized; every macro call before `init_logger` is a
//! silent no-op, so library code can log unconditionally.

use super::output::{LogLevel, Output};
use std::io;
use std::sync::{Arc, OnceLock};

struct GlobalLogger {
    output: Arc<dyn Output>,
    level_filter: LogLevel,
}

static LOGGER: OnceLock<GlobalLogger> = OnceLock::new();

/// Install the global logger. Only the first call takes effect.
pub fn init_logger(output: Arc<dyn Output>, level: LogLevel) {
    let _ = LOGGER.get_or_init(|| GlobalLogger {
        output,
        level_filter: level,
    });
}

/// Write one message through the global logger. Called by the macros.
///
/// # Errors
///
/// Returns any underlying I/O error from the output backend.
#[inline]
pub(crate) fn log_message(level: LogLevel, message: &str) -> io::Result<()> {
    match LOGGER.get() {
        Some(logger) if level >= logger.level_filter => logger.output.write(level, message),
        _ => Ok(()),
    }
}

/// Flush the global logger's output. Safe before initialization.
///
/// # Errors
///
/// Returns any underlying I/O error from the output backend.
pub fn flush_logger() -> io::Result<()> {
    match LOGGER.get() {
        Some(logger) => logger.output.flush(),
        None => Ok(()),
    }
}
