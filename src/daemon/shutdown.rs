//! Shutdown cleanup: one routine for every exit path, run exactly once.

use std::rc::Rc;

use parking_lot::Mutex;

use crate::logger::EventLogger;
use crate::platform::pal::{Clock, LinkControl};
use crate::store::{StateStore, KEY_HEARTBEAT, KEY_QUEUE};

use super::lock::SingletonLock;

/// Restores the interface, drops transient state, and releases the
/// singleton lock. Termination signals and the normal return path both
/// land here; the guard makes the second arrival a no-op, and `Drop`
/// covers panics.
pub struct Cleanup {
    link: Box<dyn LinkControl>,
    interface: String,
    store: Rc<dyn StateStore>,
    logger: Rc<EventLogger>,
    clock: Rc<dyn Clock>,
    lock: Option<SingletonLock>,
    ran: Mutex<bool>,
}

impl Cleanup {
    pub fn new(
        link: Box<dyn LinkControl>,
        interface: String,
        store: Rc<dyn StateStore>,
        logger: Rc<EventLogger>,
        clock: Rc<dyn Clock>,
        lock: Option<SingletonLock>,
    ) -> Self {
        Self {
            link,
            interface,
            store,
            logger,
            clock,
            lock,
            ran: Mutex::new(false),
        }
    }

    pub fn run(&mut self) {
        {
            let mut ran = self.ran.lock();
            if *ran {
                return;
            }
            *ran = true;
        }
        // Never leave the link down, whatever state the recovery
        // sub-loop was in when the signal landed.
        if !self.link.ensure_up(&self.interface) {
            self.logger.note(
                self.clock.now(),
                "could not confirm interface up during shutdown",
            );
        }
        // A clean stop must not read as a script interruption on the
        // next start.
        let _ = self.store.remove(KEY_HEARTBEAT);
        let _ = self.store.remove(KEY_QUEUE);
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
        self.logger.note(self.clock.now(), "watchdog stopped");
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.run();
    }
}
