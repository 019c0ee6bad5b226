//! Custom failsafe capture

use txlink_protocol::{
    ChannelOutputs, ModelSettings, ModuleSlot, FAILSAFE_CHANNEL_HOLD, FAILSAFE_NEUTRAL,
};

/// Store the current outputs as the failsafe of `slot`'s channels
///
/// Channels the module transmits take the live output value, unless they are
/// set to hold or no-pulse. Every other channel is reset to neutral.
pub fn capture_failsafe(model: &mut ModelSettings, outputs: &ChannelOutputs, slot: ModuleSlot) {
    let sent = model.module(slot).channel_range();
    for (channel, stored) in model.failsafe_channels.iter_mut().enumerate() {
        if !sent.contains(&channel) {
            *stored = FAILSAFE_NEUTRAL;
        } else if *stored < FAILSAFE_CHANNEL_HOLD {
            *stored = outputs.0[channel];
        }
    }
}
