//! Shared domain types for mixbridge.
//!
//! These types are used across all crates and form the vocabulary of the
//! bridge: liveness classification, addressable target kinds, bus slots, and
//! the partial-update patches that carry console-derived state to clients.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of addressable effect-return strips (1-based, `1..=RETURN_COUNT`).
pub const RETURN_COUNT: u8 = 4;

/// Number of addressable input channels (1-based, `1..=CHANNEL_COUNT`).
pub const CHANNEL_COUNT: u8 = 16;

/// Health classification of the console session.
///
/// Always derived from receipt timestamps, never stored as independent truth.
/// Control writes are permitted only while the session is [`Live`](Self::Live).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LivenessState {
    /// No console reply within the offline threshold.
    Offline,
    /// Some recent activity, but not fresh enough on both signals.
    Stale,
    /// Console replies and meter frames are both fresh.
    Live,
}

impl LivenessState {
    /// Returns `true` if control writes may be forwarded to the console.
    pub fn permits_writes(self) -> bool {
        self == LivenessState::Live
    }
}

impl fmt::Display for LivenessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivenessState::Offline => write!(f, "OFFLINE"),
            LivenessState::Stale => write!(f, "STALE"),
            LivenessState::Live => write!(f, "LIVE"),
        }
    }
}

/// Kind of a client-registered monitoring target.
///
/// Only input channels exist today; the tag is carried on the wire so new
/// kinds can be added without changing message shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    /// An input channel, `1..=CHANNEL_COUNT`.
    #[serde(rename = "ch")]
    Channel,
}

/// One of the three routing destinations a return strip can be assigned to.
///
/// Serialized as `"A"`, `"B"` or `"C"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BusSlot {
    A,
    B,
    C,
}

impl BusSlot {
    /// All bus slots in console order.
    pub const ALL: [BusSlot; 3] = [BusSlot::A, BusSlot::B, BusSlot::C];

    /// Zero-based position of this slot.
    pub fn index(self) -> usize {
        match self {
            BusSlot::A => 0,
            BusSlot::B => 1,
            BusSlot::C => 2,
        }
    }

    /// Console bus number (1-based) this slot is routed to.
    pub fn bus_number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Look up a slot from its zero-based position.
    pub fn from_index(index: usize) -> Option<BusSlot> {
        BusSlot::ALL.get(index).copied()
    }

    /// Look up a slot from the console's 1-based bus number.
    pub fn from_bus_number(bus: u8) -> Option<BusSlot> {
        (bus as usize).checked_sub(1).and_then(BusSlot::from_index)
    }
}

impl fmt::Display for BusSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusSlot::A => write!(f, "A"),
            BusSlot::B => write!(f, "B"),
            BusSlot::C => write!(f, "C"),
        }
    }
}

/// Partial state update for one return strip.
///
/// Only fields that changed are `Some`; receivers must merge the patch into
/// their own copy rather than treat it as a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnPatch {
    /// Return index, `1..=RETURN_COUNT`.
    pub target_index: u8,
    /// Fader position, normalized 0.0-1.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fader: Option<f32>,
    /// Mute flag (already converted from console polarity).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Meter level, normalized 0.0-1.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter: Option<f32>,
    /// Whether any signal is present, independent of the displayed level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_present: Option<bool>,
    /// Assignment to bus slot A.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_a: Option<bool>,
    /// Assignment to bus slot B.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_b: Option<bool>,
    /// Assignment to bus slot C.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_c: Option<bool>,
}

impl ReturnPatch {
    /// Create an empty patch for the given return.
    pub fn new(target_index: u8) -> Self {
        ReturnPatch {
            target_index,
            ..ReturnPatch::default()
        }
    }

    /// Set the assignment flag for one bus slot.
    pub fn set_bus(&mut self, slot: BusSlot, assigned: bool) {
        match slot {
            BusSlot::A => self.bus_a = Some(assigned),
            BusSlot::B => self.bus_b = Some(assigned),
            BusSlot::C => self.bus_c = Some(assigned),
        }
    }

    /// Returns `true` if the patch carries no field changes.
    pub fn is_empty(&self) -> bool {
        self.fader.is_none()
            && self.mute.is_none()
            && self.name.is_none()
            && self.meter.is_none()
            && self.signal_present.is_none()
            && self.bus_a.is_none()
            && self.bus_b.is_none()
            && self.bus_c.is_none()
    }
}

/// Partial state update for one registered channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPatch {
    pub target_type: TargetType,
    /// Channel index, `1..=CHANNEL_COUNT`.
    pub target_index: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_present: Option<bool>,
}

impl ChannelPatch {
    /// Create an empty patch for the given channel.
    pub fn new(target_index: u8) -> Self {
        ChannelPatch {
            target_type: TargetType::Channel,
            target_index,
            muted: None,
            meter: None,
            name: None,
            signal_present: None,
        }
    }

    /// Returns `true` if the patch carries no field changes.
    pub fn is_empty(&self) -> bool {
        self.muted.is_none()
            && self.meter.is_none()
            && self.name.is_none()
            && self.signal_present.is_none()
    }
}

/// Partial update of the routing-destination display names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusNamesPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_a: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_b: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_c: Option<String>,
}

impl BusNamesPatch {
    /// Set the name for one bus slot.
    pub fn set(&mut self, slot: BusSlot, name: String) {
        match slot {
            BusSlot::A => self.bus_a = Some(name),
            BusSlot::B => self.bus_b = Some(name),
            BusSlot::C => self.bus_c = Some(name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bus_a.is_none() && self.bus_b.is_none() && self.bus_c.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_only_live_permits_writes() {
        assert!(LivenessState::Live.permits_writes());
        assert!(!LivenessState::Stale.permits_writes());
        assert!(!LivenessState::Offline.permits_writes());
    }

    #[test]
    fn liveness_serializes_uppercase() {
        let json = serde_json::to_string(&LivenessState::Stale).unwrap();
        assert_eq!(json, "\"STALE\"");
        assert_eq!(LivenessState::Offline.to_string(), "OFFLINE");
    }

    #[test]
    fn target_type_wire_tag() {
        assert_eq!(serde_json::to_string(&TargetType::Channel).unwrap(), "\"ch\"");
        let t: TargetType = serde_json::from_str("\"ch\"").unwrap();
        assert_eq!(t, TargetType::Channel);
        assert!(serde_json::from_str::<TargetType>("\"bus\"").is_err());
    }

    #[test]
    fn bus_slot_numbering() {
        assert_eq!(BusSlot::A.bus_number(), 1);
        assert_eq!(BusSlot::C.bus_number(), 3);
        assert_eq!(BusSlot::from_bus_number(2), Some(BusSlot::B));
        assert_eq!(BusSlot::from_bus_number(0), None);
        assert_eq!(BusSlot::from_bus_number(4), None);
        assert_eq!(BusSlot::from_index(3), None);
    }

    #[test]
    fn bus_slot_wire_names() {
        assert_eq!(serde_json::to_string(&BusSlot::B).unwrap(), "\"B\"");
        let slot: BusSlot = serde_json::from_str("\"C\"").unwrap();
        assert_eq!(slot, BusSlot::C);
        assert!(serde_json::from_str::<BusSlot>("\"D\"").is_err());
    }

    #[test]
    fn return_patch_omits_unchanged_fields() {
        let mut patch = ReturnPatch::new(2);
        assert!(patch.is_empty());
        patch.fader = Some(0.5);
        patch.set_bus(BusSlot::B, true);
        assert!(!patch.is_empty());

        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"targetIndex": 2, "fader": 0.5, "busB": true})
        );
    }

    #[test]
    fn channel_patch_shape() {
        let mut patch = ChannelPatch::new(5);
        patch.name = Some("Desk Mic".into());
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"targetType": "ch", "targetIndex": 5, "name": "Desk Mic"})
        );
    }

    #[test]
    fn bus_names_patch_set() {
        let mut patch = BusNamesPatch::default();
        assert!(patch.is_empty());
        patch.set(BusSlot::C, "Monitors".into());
        assert_eq!(patch.bus_c.as_deref(), Some("Monitors"));
        assert!(!patch.is_empty());
    }
}
