//! Frame dispatch
//!
//! Pulled protocols are sent from the mixer loop right after the outputs are
//! computed ([`PulseEngine::dispatch_synchronous`]). Pushed protocols
//! free-run in hardware once started, and their DMA/interrupt path calls
//! [`PulseEngine::refill_pushed`] to build the next buffer.
//!
//! While pulses are paused the mixer loop calls
//! [`PulseEngine::settle_synchronous`] instead of dispatching, so pulled
//! drivers are stopped without a frame going out.

use tracing::trace;
use txlink_protocol::{ModuleSlot, NUM_MODULES};

use crate::engine::PulseEngine;

impl PulseEngine {
    /// Returns whether a slot's frames are sent from the mixer loop
    pub fn is_module_synchronous(&self, slot: ModuleSlot) -> bool {
        self.has_slot(slot) && self.active_protocol(slot).is_pulled()
    }

    /// Service every synchronous slot, internal first
    ///
    /// Returns, per slot index, whether a frame was sent.
    pub fn dispatch_synchronous(&mut self) -> [bool; NUM_MODULES] {
        let mut sent = [false; NUM_MODULES];
        for slot in ModuleSlot::ALL {
            if self.is_module_synchronous(slot) && self.run_slot(slot) {
                self.send_next_frame(slot);
                trace!("{} module: frame sent", slot);
                sent[slot.index()] = true;
            }
        }
        sent
    }

    /// Lifecycle step of every synchronous slot, never sending
    pub fn settle_synchronous(&mut self) {
        for slot in ModuleSlot::ALL {
            if self.is_module_synchronous(slot) {
                self.run_slot(slot);
            }
        }
    }

    /// Refill entry point of a pushed (hardware-paced) slot
    ///
    /// Does nothing while the slot runs a pulled protocol. Returns whether a
    /// frame was handed to the hardware.
    pub fn refill_pushed(&mut self, slot: ModuleSlot) -> bool {
        if !self.has_slot(slot) || self.active_protocol(slot).is_pulled() {
            return false;
        }
        if self.run_slot(slot) {
            self.send_next_frame(slot);
            true
        } else {
            false
        }
    }
}
