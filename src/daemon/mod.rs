//! Daemon subsystem: singleton lock, signal handling, shutdown cleanup,
//! and the main monitoring loop.

pub mod lock;
pub mod loop_main;
pub mod shutdown;
pub mod signals;
