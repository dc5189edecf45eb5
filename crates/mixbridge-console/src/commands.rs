//! Console address construction and report parsing.
//!
//! Builders return a [`WireMessage`] ready for [`encode`](crate::codec::encode);
//! a builder without a value argument is a query. [`parse_report`] does the
//! inverse for inbound traffic, routing a decoded message to a typed
//! [`ConsoleReport`] by address pattern.
//!
//! # Address families
//!
//! ```text
//! /rtn/{n}/mix/fader        f   return fader, 0.0-1.0
//! /rtn/{n}/mix/on           i   return on (1 = unmuted)
//! /rtn/{n}/config/name      s   return display name
//! /rtn/{n}/mix/{bb}/on      i   return -> bus bb assignment
//! /ch/{nn}/mix/on           i   channel on (1 = unmuted)
//! /ch/{nn}/config/name      s   channel display name
//! /bus/{n}/config/name      s   bus display name
//! /xremote                      keep-alive / remote session
//! /meters   ,si <block> <count> meter subscription
//! /renew    ,s  <block>         meter subscription renewal
//! ```
//!
//! The console's "on" flag is the inverse of "muted". The conversion happens
//! only in [`muted_to_on`] (writes) and [`on_to_muted`] (reads).

use mixbridge_core::types::{BusSlot, CHANNEL_COUNT, RETURN_COUNT};

use crate::codec::{Arg, WireMessage};

/// Keep-alive query that holds the remote session open.
pub const KEEPALIVE_ADDR: &str = "/xremote";

/// Meter subscription command.
pub const METER_SUBSCRIBE_ADDR: &str = "/meters";

/// Meter subscription renewal command.
pub const METER_RENEW_ADDR: &str = "/renew";

// ---------------------------------------------------------------------------
// Mute polarity
// ---------------------------------------------------------------------------

/// Convert a muted flag to the console's "on" integer.
pub fn muted_to_on(muted: bool) -> i32 {
    if muted { 0 } else { 1 }
}

/// Convert the console's "on" integer to a muted flag.
pub fn on_to_muted(on: i32) -> bool {
    on == 0
}

// ---------------------------------------------------------------------------
// Session commands
// ---------------------------------------------------------------------------

/// Build the keep-alive query.
pub fn keepalive() -> WireMessage {
    WireMessage::new(KEEPALIVE_ADDR)
}

/// Build the meter subscription for a block, e.g. `"/meters/1"`.
pub fn subscribe_meters(block: &str, sample_count: i32) -> WireMessage {
    WireMessage::new(METER_SUBSCRIBE_ADDR)
        .with_arg(Arg::Str(block.to_string()))
        .with_arg(Arg::Int(sample_count))
}

/// Build the meter subscription renewal for a block.
pub fn renew_meters(block: &str) -> WireMessage {
    WireMessage::new(METER_RENEW_ADDR).with_arg(Arg::Str(block.to_string()))
}

// ---------------------------------------------------------------------------
// Return strips
// ---------------------------------------------------------------------------

fn return_fader_addr(index: u8) -> String {
    format!("/rtn/{index}/mix/fader")
}

fn return_on_addr(index: u8) -> String {
    format!("/rtn/{index}/mix/on")
}

fn return_name_addr(index: u8) -> String {
    format!("/rtn/{index}/config/name")
}

fn return_bus_addr(index: u8, slot: BusSlot) -> String {
    format!("/rtn/{index}/mix/{:02}/on", slot.bus_number())
}

/// Query a return's fader position.
pub fn query_return_fader(index: u8) -> WireMessage {
    WireMessage::new(return_fader_addr(index))
}

/// Set a return's fader position (0.0-1.0).
pub fn set_return_fader(index: u8, value: f32) -> WireMessage {
    WireMessage::new(return_fader_addr(index)).with_arg(Arg::Float(value))
}

/// Query a return's mute state.
pub fn query_return_mute(index: u8) -> WireMessage {
    WireMessage::new(return_on_addr(index))
}

/// Set a return's mute state.
pub fn set_return_mute(index: u8, muted: bool) -> WireMessage {
    WireMessage::new(return_on_addr(index)).with_arg(Arg::Int(muted_to_on(muted)))
}

/// Query a return's display name.
pub fn query_return_name(index: u8) -> WireMessage {
    WireMessage::new(return_name_addr(index))
}

/// Query a return's assignment to one bus.
pub fn query_return_bus(index: u8, slot: BusSlot) -> WireMessage {
    WireMessage::new(return_bus_addr(index, slot))
}

/// Assign or unassign a return to one bus.
pub fn set_return_bus(index: u8, slot: BusSlot, assigned: bool) -> WireMessage {
    WireMessage::new(return_bus_addr(index, slot)).with_arg(Arg::Int(assigned as i32))
}

// ---------------------------------------------------------------------------
// Channels and buses
// ---------------------------------------------------------------------------

fn channel_on_addr(index: u8) -> String {
    format!("/ch/{index:02}/mix/on")
}

fn channel_name_addr(index: u8) -> String {
    format!("/ch/{index:02}/config/name")
}

/// Query a channel's mute state.
pub fn query_channel_mute(index: u8) -> WireMessage {
    WireMessage::new(channel_on_addr(index))
}

/// Set a channel's mute state.
pub fn set_channel_mute(index: u8, muted: bool) -> WireMessage {
    WireMessage::new(channel_on_addr(index)).with_arg(Arg::Int(muted_to_on(muted)))
}

/// Query a channel's display name.
pub fn query_channel_name(index: u8) -> WireMessage {
    WireMessage::new(channel_name_addr(index))
}

/// Query a bus display name.
pub fn query_bus_name(slot: BusSlot) -> WireMessage {
    WireMessage::new(format!("/bus/{}/config/name", slot.bus_number()))
}

// ---------------------------------------------------------------------------
// Report parsing
// ---------------------------------------------------------------------------

/// A console fact recognized from an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleReport {
    ReturnFader { index: u8, value: f32 },
    ReturnMute { index: u8, muted: bool },
    ReturnName { index: u8, name: String },
    ReturnBus { index: u8, slot: BusSlot, assigned: bool },
    ChannelMute { index: u8, muted: bool },
    ChannelName { index: u8, name: String },
    BusName { slot: BusSlot, name: String },
    /// Raw meter blob for the subscribed block.
    Meters { blob: Vec<u8> },
}

fn parse_index(text: &str, max: u8) -> Option<u8> {
    let index: u8 = text.parse().ok()?;
    (1..=max).contains(&index).then_some(index)
}

fn parse_bus(text: &str) -> Option<BusSlot> {
    BusSlot::from_bus_number(text.parse().ok()?)
}

/// Route a decoded message to a typed report.
///
/// Returns `None` for addresses this bridge does not track, out-of-range
/// indices, and messages whose argument is missing or of the wrong type
/// (for instance, a query echoed back without a value).
pub fn parse_report(msg: &WireMessage, meter_block: &str) -> Option<ConsoleReport> {
    if msg.address == meter_block {
        let blob = msg.first_arg()?.as_blob()?;
        return Some(ConsoleReport::Meters {
            blob: blob.to_vec(),
        });
    }

    let arg = msg.first_arg()?;
    let parts: Vec<&str> = msg.address.trim_start_matches('/').split('/').collect();

    let report = match parts.as_slice() {
        ["rtn", n, "mix", "fader"] => {
            let value = arg.as_f32().filter(|v| v.is_finite())?;
            ConsoleReport::ReturnFader {
                index: parse_index(n, RETURN_COUNT)?,
                value: value.clamp(0.0, 1.0),
            }
        }
        ["rtn", n, "mix", "on"] => ConsoleReport::ReturnMute {
            index: parse_index(n, RETURN_COUNT)?,
            muted: on_to_muted(arg.as_i32()?),
        },
        ["rtn", n, "config", "name"] => ConsoleReport::ReturnName {
            index: parse_index(n, RETURN_COUNT)?,
            name: arg.as_str()?.to_string(),
        },
        ["rtn", n, "mix", bus, "on"] => ConsoleReport::ReturnBus {
            index: parse_index(n, RETURN_COUNT)?,
            slot: parse_bus(bus)?,
            assigned: arg.as_i32()? != 0,
        },
        ["ch", n, "mix", "on"] => ConsoleReport::ChannelMute {
            index: parse_index(n, CHANNEL_COUNT)?,
            muted: on_to_muted(arg.as_i32()?),
        },
        ["ch", n, "config", "name"] => ConsoleReport::ChannelName {
            index: parse_index(n, CHANNEL_COUNT)?,
            name: arg.as_str()?.to_string(),
        },
        ["bus", n, "config", "name"] => ConsoleReport::BusName {
            slot: parse_bus(n)?,
            name: arg.as_str()?.to_string(),
        },
        _ => return None,
    };

    Some(report)
}
