//! Target registry: the bridge's cached view of console state.
//!
//! The registry holds the fixed set of return strips, the channels clients
//! have registered, and the bus display names. Every `apply_*` method merges
//! one console fact and returns a patch containing only the fields that
//! actually changed, or `None` when nothing did. Fields start as `None`
//! (unknown) until the console first reports them.
//!
//! The registry is owned by [`ConsoleSession`](crate::session::ConsoleSession)
//! and mutated from a single task, so it needs no locking.

use std::collections::BTreeMap;

use mixbridge_core::error::{Error, Result};
use mixbridge_core::types::{
    BusNamesPatch, BusSlot, CHANNEL_COUNT, ChannelPatch, RETURN_COUNT, ReturnPatch,
};

use crate::meters::StripLevel;

/// Meter level changes smaller than this are not reported.
pub const METER_EPSILON: f32 = 0.001;

/// Store `value` if it differs from the current one. Returns the value when
/// it changed.
fn update<T: PartialEq + Clone>(slot: &mut Option<T>, value: T) -> Option<T> {
    if slot.as_ref() == Some(&value) {
        return None;
    }
    *slot = Some(value.clone());
    Some(value)
}

fn update_level(slot: &mut Option<f32>, value: f32) -> Option<f32> {
    match slot {
        Some(current) if (*current - value).abs() < METER_EPSILON => None,
        _ => {
            *slot = Some(value);
            Some(value)
        }
    }
}

/// Cached state of one effect-return strip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnTarget {
    /// Return index, `1..=RETURN_COUNT`.
    pub index: u8,
    pub fader: Option<f32>,
    pub mute: Option<bool>,
    pub name: Option<String>,
    pub meter: Option<f32>,
    pub signal_present: Option<bool>,
    /// Assignment flags, indexed by [`BusSlot::index`].
    pub buses: [Option<bool>; 3],
}

impl ReturnTarget {
    fn new(index: u8) -> Self {
        ReturnTarget {
            index,
            ..ReturnTarget::default()
        }
    }

    /// A patch carrying every known field.
    pub fn snapshot(&self) -> ReturnPatch {
        let mut patch = ReturnPatch::new(self.index);
        patch.fader = self.fader;
        patch.mute = self.mute;
        patch.name = self.name.clone();
        patch.meter = self.meter;
        patch.signal_present = self.signal_present;
        for slot in BusSlot::ALL {
            if let Some(assigned) = self.buses[slot.index()] {
                patch.set_bus(slot, assigned);
            }
        }
        patch
    }
}

/// Cached state of one registered input channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelTarget {
    /// Channel index, `1..=CHANNEL_COUNT`.
    pub index: u8,
    pub muted: Option<bool>,
    pub name: Option<String>,
    pub meter: Option<f32>,
    pub signal_present: Option<bool>,
}

impl ChannelTarget {
    fn new(index: u8) -> Self {
        ChannelTarget {
            index,
            ..ChannelTarget::default()
        }
    }

    /// A patch carrying every known field.
    pub fn snapshot(&self) -> ChannelPatch {
        let mut patch = ChannelPatch::new(self.index);
        patch.muted = self.muted;
        patch.name = self.name.clone();
        patch.meter = self.meter;
        patch.signal_present = self.signal_present;
        patch
    }
}

/// Owned store of all console-derived target state.
#[derive(Debug, Clone)]
pub struct Registry {
    returns: Vec<ReturnTarget>,
    channels: BTreeMap<u8, ChannelTarget>,
    bus_names: [Option<String>; 3],
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl Registry {
    /// Create a registry with every return strip present and no channels.
    pub fn new() -> Self {
        Registry {
            returns: (1..=RETURN_COUNT).map(ReturnTarget::new).collect(),
            channels: BTreeMap::new(),
            bus_names: [None, None, None],
        }
    }

    // -----------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------

    /// Return strip by 1-based index.
    pub fn return_target(&self, index: u8) -> Option<&ReturnTarget> {
        (index as usize)
            .checked_sub(1)
            .and_then(|i| self.returns.get(i))
    }

    fn return_target_mut(&mut self, index: u8) -> Option<&mut ReturnTarget> {
        (index as usize)
            .checked_sub(1)
            .and_then(|i| self.returns.get_mut(i))
    }

    /// All return strips in index order.
    pub fn returns(&self) -> impl Iterator<Item = &ReturnTarget> {
        self.returns.iter()
    }

    /// Registered channel by 1-based index.
    pub fn channel(&self, index: u8) -> Option<&ChannelTarget> {
        self.channels.get(&index)
    }

    /// Registered channels in index order.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelTarget> {
        self.channels.values()
    }

    /// Indices of registered channels in ascending order.
    pub fn channel_indices(&self) -> Vec<u8> {
        self.channels.keys().copied().collect()
    }

    /// Known display name for a bus slot.
    pub fn bus_name(&self, slot: BusSlot) -> Option<&str> {
        self.bus_names[slot.index()].as_deref()
    }

    // -----------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------

    /// Register a channel for monitoring.
    ///
    /// Idempotent: returns `Ok(true)` if the channel was added, `Ok(false)`
    /// if it was already registered. Indices outside `1..=CHANNEL_COUNT`
    /// are rejected.
    pub fn register_channel(&mut self, index: u8) -> Result<bool> {
        if !(1..=CHANNEL_COUNT).contains(&index) {
            return Err(Error::InvalidParameter(format!(
                "channel index {index} out of range 1..={CHANNEL_COUNT}"
            )));
        }
        if self.channels.contains_key(&index) {
            return Ok(false);
        }
        self.channels.insert(index, ChannelTarget::new(index));
        Ok(true)
    }

    // -----------------------------------------------------------------
    // Return updates
    // -----------------------------------------------------------------

    fn patch_return(
        &mut self,
        index: u8,
        apply: impl FnOnce(&mut ReturnTarget, &mut ReturnPatch),
    ) -> Option<ReturnPatch> {
        let target = self.return_target_mut(index)?;
        let mut patch = ReturnPatch::new(index);
        apply(target, &mut patch);
        (!patch.is_empty()).then_some(patch)
    }

    pub fn apply_return_fader(&mut self, index: u8, value: f32) -> Option<ReturnPatch> {
        self.patch_return(index, |t, p| p.fader = update(&mut t.fader, value))
    }

    pub fn apply_return_mute(&mut self, index: u8, muted: bool) -> Option<ReturnPatch> {
        self.patch_return(index, |t, p| p.mute = update(&mut t.mute, muted))
    }

    pub fn apply_return_name(&mut self, index: u8, name: &str) -> Option<ReturnPatch> {
        self.patch_return(index, |t, p| p.name = update(&mut t.name, name.to_string()))
    }

    pub fn apply_return_bus(
        &mut self,
        index: u8,
        slot: BusSlot,
        assigned: bool,
    ) -> Option<ReturnPatch> {
        self.patch_return(index, |t, p| {
            if let Some(v) = update(&mut t.buses[slot.index()], assigned) {
                p.set_bus(slot, v);
            }
        })
    }

    pub fn apply_return_level(&mut self, index: u8, level: StripLevel) -> Option<ReturnPatch> {
        self.patch_return(index, |t, p| {
            p.meter = update_level(&mut t.meter, level.level);
            p.signal_present = update(&mut t.signal_present, level.signal_present);
        })
    }

    // -----------------------------------------------------------------
    // Channel updates (registered channels only)
    // -----------------------------------------------------------------

    fn patch_channel(
        &mut self,
        index: u8,
        apply: impl FnOnce(&mut ChannelTarget, &mut ChannelPatch),
    ) -> Option<ChannelPatch> {
        let target = self.channels.get_mut(&index)?;
        let mut patch = ChannelPatch::new(index);
        apply(target, &mut patch);
        (!patch.is_empty()).then_some(patch)
    }

    pub fn apply_channel_mute(&mut self, index: u8, muted: bool) -> Option<ChannelPatch> {
        self.patch_channel(index, |t, p| p.muted = update(&mut t.muted, muted))
    }

    pub fn apply_channel_name(&mut self, index: u8, name: &str) -> Option<ChannelPatch> {
        self.patch_channel(index, |t, p| p.name = update(&mut t.name, name.to_string()))
    }

    pub fn apply_channel_level(&mut self, index: u8, level: StripLevel) -> Option<ChannelPatch> {
        self.patch_channel(index, |t, p| {
            p.meter = update_level(&mut t.meter, level.level);
            p.signal_present = update(&mut t.signal_present, level.signal_present);
        })
    }

    // -----------------------------------------------------------------
    // Bus names
    // -----------------------------------------------------------------

    pub fn apply_bus_name(&mut self, slot: BusSlot, name: &str) -> Option<BusNamesPatch> {
        let changed = update(&mut self.bus_names[slot.index()], name.to_string())?;
        let mut patch = BusNamesPatch::default();
        patch.set(slot, changed);
        Some(patch)
    }

    // -----------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------

    /// Full-state patches for every return with at least one known field.
    pub fn return_snapshots(&self) -> Vec<ReturnPatch> {
        self.returns
            .iter()
            .map(ReturnTarget::snapshot)
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Full-state patches for every registered channel with at least one
    /// known field.
    pub fn channel_snapshots(&self) -> Vec<ChannelPatch> {
        self.channels
            .values()
            .map(ChannelTarget::snapshot)
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// All known bus names.
    pub fn bus_names_snapshot(&self) -> BusNamesPatch {
        let mut patch = BusNamesPatch::default();
        for slot in BusSlot::ALL {
            if let Some(name) = &self.bus_names[slot.index()] {
                patch.set(slot, name.clone());
            }
        }
        patch
    }
}
