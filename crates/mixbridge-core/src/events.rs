//! Console-derived events.
//!
//! The console session emits a [`ConsoleEvent`] for every fact that changed
//! the target registry, and the liveness model emits one whenever the derived
//! state changes. The relay layer translates these into client broadcasts.

use crate::types::{BusNamesPatch, ChannelPatch, LivenessState, ReturnPatch};

/// An event emitted when console-derived state changes.
///
/// Patches carry only the fields that actually changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    /// One or more fields of a return strip changed.
    ReturnChanged(ReturnPatch),

    /// One or more fields of a registered channel changed.
    ChannelChanged(ChannelPatch),

    /// One or more routing-destination names changed.
    BusNamesChanged(BusNamesPatch),

    /// The derived liveness state changed.
    LivenessChanged {
        /// New state.
        state: LivenessState,
        /// Wall-clock time (ms since Unix epoch) of the last decoded console reply.
        last_console_reply_at: Option<u64>,
        /// Wall-clock time (ms since Unix epoch) of the last decoded meter frame.
        last_meter_frame_at: Option<u64>,
    },
}
