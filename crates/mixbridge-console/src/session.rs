//! Console session manager.
//!
//! [`ConsoleSession`] owns the console link, the target [`Registry`], and
//! the [`LivenessMonitor`]. It builds every outbound command (address
//! construction lives in [`commands`](crate::commands), serialization in
//! [`codec`](crate::codec)) and folds every inbound datagram into registry
//! patches and liveness timestamps.
//!
//! The session does not own any timers. The caller drives it: periodic
//! keep-alive, poll and renewal sends, liveness evaluation, and the recovery
//! callback. This keeps the session testable without a clock.
//!
//! All sends return `Result<()>`; a failed datagram send is reported to the
//! caller, which logs it and carries on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mixbridge_core::error::{Error, Result};
use mixbridge_core::events::ConsoleEvent;
use mixbridge_core::transport::ConsoleLink;
use mixbridge_core::types::{BusSlot, ChannelPatch, LivenessState, RETURN_COUNT, ReturnPatch};

use crate::codec::{self, WireMessage};
use crate::commands::{self, ConsoleReport};
use crate::liveness::{LivenessMonitor, LivenessThresholds, Transition};
use crate::meters::{self, MeterFrame, MeterLayout, StripLevel};
use crate::registry::Registry;

/// Default keep-alive period. The console drops remote sessions after 10 s.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(8);

/// Default return-strip poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default meter subscription renewal period.
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(1);

/// Default meter block address.
pub const DEFAULT_METER_BLOCK: &str = "/meters/1";

/// Default expected sample count for the meter block.
pub const DEFAULT_METER_SAMPLE_COUNT: i32 = 40;

/// Options for the console session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Keep-alive query period.
    pub keepalive_interval: Duration,
    /// Return-strip poll period.
    pub poll_interval: Duration,
    /// Meter subscription renewal period.
    pub renew_interval: Duration,
    /// Meter block to subscribe to; meter blobs arrive on this address.
    pub meter_block: String,
    /// Sample count announced in the subscription.
    pub meter_sample_count: i32,
    /// Strip positions within the meter block.
    pub meter_layout: MeterLayout,
    /// Display floor for return strips, in dB.
    pub return_floor_db: f32,
    /// Display floor for channel strips, in dB.
    pub channel_floor_db: f32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            renew_interval: DEFAULT_RENEW_INTERVAL,
            meter_block: DEFAULT_METER_BLOCK.to_string(),
            meter_sample_count: DEFAULT_METER_SAMPLE_COUNT,
            meter_layout: MeterLayout::default(),
            return_floor_db: meters::RETURN_FLOOR_DB,
            channel_floor_db: meters::CHANNEL_FLOOR_DB,
        }
    }
}

/// A live control/telemetry session with one console.
pub struct ConsoleSession {
    link: Arc<dyn ConsoleLink>,
    options: SessionOptions,
    registry: Registry,
    liveness: LivenessMonitor,
}

impl ConsoleSession {
    pub fn new(
        link: Arc<dyn ConsoleLink>,
        options: SessionOptions,
        thresholds: LivenessThresholds,
    ) -> Self {
        Self {
            link,
            options,
            registry: Registry::new(),
            liveness: LivenessMonitor::new(thresholds),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    /// Current derived liveness state.
    pub fn state(&self) -> LivenessState {
        self.liveness.state()
    }

    // -----------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------

    async fn send(&self, msg: &WireMessage) -> Result<()> {
        tracing::trace!(address = %msg.address, tags = %msg.type_tags(), "Console send");
        self.link.send(&msg.encode()).await
    }

    async fn send_all(&self, msgs: impl IntoIterator<Item = WireMessage>) -> Result<()> {
        for msg in msgs {
            self.send(&msg).await?;
        }
        Ok(())
    }

    /// Subscribe to meters, then poll everything.
    pub async fn start(&self) -> Result<()> {
        tracing::debug!(block = %self.options.meter_block, "Starting console session");
        self.subscribe_meters().await?;
        self.poll_full().await
    }

    pub async fn send_keepalive(&self) -> Result<()> {
        self.send(&commands::keepalive()).await
    }

    pub async fn subscribe_meters(&self) -> Result<()> {
        self.send(&commands::subscribe_meters(
            &self.options.meter_block,
            self.options.meter_sample_count,
        ))
        .await
    }

    pub async fn renew_meters(&self) -> Result<()> {
        self.send(&commands::renew_meters(&self.options.meter_block))
            .await
    }

    /// Query fader, mute, name and bus assignments of every return.
    pub async fn poll_returns(&self) -> Result<()> {
        let queries = (1..=RETURN_COUNT).flat_map(|index| {
            [
                commands::query_return_fader(index),
                commands::query_return_mute(index),
                commands::query_return_name(index),
            ]
            .into_iter()
            .chain(
                BusSlot::ALL
                    .into_iter()
                    .map(move |slot| commands::query_return_bus(index, slot)),
            )
        });
        self.send_all(queries).await
    }

    /// Poll returns, bus names, and every registered channel.
    pub async fn poll_full(&self) -> Result<()> {
        self.poll_returns().await?;
        self.send_all(BusSlot::ALL.into_iter().map(commands::query_bus_name))
            .await?;
        for index in self.registry.channel_indices() {
            self.query_channel(index).await?;
        }
        Ok(())
    }

    async fn query_channel(&self, index: u8) -> Result<()> {
        self.send(&commands::query_channel_mute(index)).await?;
        self.send(&commands::query_channel_name(index)).await
    }

    /// Re-send the keep-alive and the meter subscription.
    pub async fn recover(&self) -> Result<()> {
        tracing::debug!("Attempting session recovery");
        self.send_keepalive().await?;
        self.subscribe_meters().await
    }

    /// Register a channel and query its mute state and name.
    ///
    /// Returns `Ok(true)` if the channel is new. Re-registering is
    /// idempotent but still queries.
    pub async fn register_channel(&mut self, index: u8) -> Result<bool> {
        let added = self.registry.register_channel(index)?;
        if added {
            tracing::debug!(index = index, "Channel registered");
        }
        self.query_channel(index).await?;
        Ok(added)
    }

    // -----------------------------------------------------------------
    // Control writes
    //
    // Each write validates, sends, then records the written value in the
    // registry. The returned patch is the optimistic echo.
    // -----------------------------------------------------------------

    fn check_return_index(index: u8) -> Result<()> {
        if (1..=RETURN_COUNT).contains(&index) {
            Ok(())
        } else {
            Err(Error::InvalidParameter(format!(
                "return index {index} out of range 1..={RETURN_COUNT}"
            )))
        }
    }

    /// Set a return fader. Finite values are clamped to 0.0-1.0.
    pub async fn set_return_fader(&mut self, index: u8, value: f64) -> Result<ReturnPatch> {
        Self::check_return_index(index)?;
        if !value.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "fader value {value} is not finite"
            )));
        }
        let value = value.clamp(0.0, 1.0) as f32;

        self.send(&commands::set_return_fader(index, value)).await?;
        self.registry.apply_return_fader(index, value);

        let mut echo = ReturnPatch::new(index);
        echo.fader = Some(value);
        Ok(echo)
    }

    pub async fn set_return_mute(&mut self, index: u8, muted: bool) -> Result<ReturnPatch> {
        Self::check_return_index(index)?;

        self.send(&commands::set_return_mute(index, muted)).await?;
        self.registry.apply_return_mute(index, muted);

        let mut echo = ReturnPatch::new(index);
        echo.mute = Some(muted);
        Ok(echo)
    }

    pub async fn set_return_bus(
        &mut self,
        index: u8,
        slot: BusSlot,
        assigned: bool,
    ) -> Result<ReturnPatch> {
        Self::check_return_index(index)?;

        self.send(&commands::set_return_bus(index, slot, assigned))
            .await?;
        self.registry.apply_return_bus(index, slot, assigned);

        let mut echo = ReturnPatch::new(index);
        echo.set_bus(slot, assigned);
        Ok(echo)
    }

    /// Invert a registered channel's mute state.
    ///
    /// Fails with [`Error::InvalidParameter`] if the channel is not
    /// registered or its mute state has not been reported yet.
    pub async fn toggle_channel_mute(&mut self, index: u8) -> Result<ChannelPatch> {
        let current = self
            .registry
            .channel(index)
            .and_then(|c| c.muted)
            .ok_or_else(|| {
                Error::InvalidParameter(format!("channel {index} mute state unknown"))
            })?;
        let muted = !current;

        self.send(&commands::set_channel_mute(index, muted)).await?;
        self.registry.apply_channel_mute(index, muted);

        let mut echo = ChannelPatch::new(index);
        echo.muted = Some(muted);
        Ok(echo)
    }

    // -----------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------

    /// Fold one received datagram into the registry.
    ///
    /// Returns the resulting state-change events. Undecodable datagrams are
    /// dropped and do not count as console replies.
    pub fn ingest(&mut self, datagram: &[u8], now: Instant) -> Vec<ConsoleEvent> {
        let Some(msg) = codec::decode(datagram) else {
            tracing::trace!(bytes = datagram.len(), "Dropping undecodable datagram");
            return Vec::new();
        };

        self.liveness.note_reply(now);

        let Some(report) = commands::parse_report(&msg, &self.options.meter_block) else {
            tracing::trace!(address = %msg.address, "Untracked console message");
            return Vec::new();
        };

        let mut events = Vec::new();
        match report {
            ConsoleReport::ReturnFader { index, value } => {
                events.extend(
                    self.registry
                        .apply_return_fader(index, value)
                        .map(ConsoleEvent::ReturnChanged),
                );
            }
            ConsoleReport::ReturnMute { index, muted } => {
                events.extend(
                    self.registry
                        .apply_return_mute(index, muted)
                        .map(ConsoleEvent::ReturnChanged),
                );
            }
            ConsoleReport::ReturnName { index, name } => {
                events.extend(
                    self.registry
                        .apply_return_name(index, &name)
                        .map(ConsoleEvent::ReturnChanged),
                );
            }
            ConsoleReport::ReturnBus {
                index,
                slot,
                assigned,
            } => {
                events.extend(
                    self.registry
                        .apply_return_bus(index, slot, assigned)
                        .map(ConsoleEvent::ReturnChanged),
                );
            }
            ConsoleReport::ChannelMute { index, muted } => {
                events.extend(
                    self.registry
                        .apply_channel_mute(index, muted)
                        .map(ConsoleEvent::ChannelChanged),
                );
            }
            ConsoleReport::ChannelName { index, name } => {
                events.extend(
                    self.registry
                        .apply_channel_name(index, &name)
                        .map(ConsoleEvent::ChannelChanged),
                );
            }
            ConsoleReport::BusName { slot, name } => {
                events.extend(
                    self.registry
                        .apply_bus_name(slot, &name)
                        .map(ConsoleEvent::BusNamesChanged),
                );
            }
            ConsoleReport::Meters { blob } => match meters::decode_meter_blob(&blob) {
                Some(frame) => {
                    self.liveness.note_meter(now);
                    self.apply_meters(&frame, &mut events);
                }
                None => {
                    tracing::debug!(bytes = blob.len(), "Dropping malformed meter blob");
                }
            },
        }
        events
    }

    fn apply_meters(&mut self, frame: &MeterFrame, events: &mut Vec<ConsoleEvent>) {
        let layout = &self.options.meter_layout;

        for index in 1..=RETURN_COUNT {
            let Some(raw) = layout.return_pair(index).and_then(|p| frame.stereo_max(p)) else {
                continue;
            };
            let level = StripLevel::from_raw(raw, self.options.return_floor_db);
            if let Some(patch) = self.registry.apply_return_level(index, level) {
                events.push(ConsoleEvent::ReturnChanged(patch));
            }
        }

        for index in self.registry.channel_indices() {
            let Some(raw) = layout.channel_position(index).and_then(|p| frame.get(p)) else {
                continue;
            };
            let level = StripLevel::from_raw(raw, self.options.channel_floor_db);
            if let Some(patch) = self.registry.apply_channel_level(index, level) {
                events.push(ConsoleEvent::ChannelChanged(patch));
            }
        }
    }

    // -----------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------

    /// Recompute liveness as of `now`. Returns a transition on change.
    pub fn evaluate_liveness(&mut self, now: Instant) -> Option<Transition> {
        self.liveness.evaluate(now)
    }

    /// Run a previously scheduled recovery if the session is still STALE.
    ///
    /// Returns `Ok(true)` if recovery commands were sent.
    pub async fn run_scheduled_recovery(&self) -> Result<bool> {
        if !self.liveness.recovery_still_wanted() {
            tracing::debug!(state = %self.state(), "Recovery no longer needed");
            return Ok(false);
        }
        self.recover().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Arg;
    use mixbridge_test_harness::MockLink;

    fn session_with_mock() -> (ConsoleSession, Arc<MockLink>) {
        let link = Arc::new(MockLink::new());
        let session = ConsoleSession::new(
            link.clone(),
            SessionOptions::default(),
            LivenessThresholds::default(),
        );
        (session, link)
    }

    fn sent_messages(link: &MockLink) -> Vec<WireMessage> {
        link.take_sent()
            .iter()
            .filter_map(|d| codec::decode(d))
            .collect()
    }

    fn sent_addresses(link: &MockLink) -> Vec<String> {
        sent_messages(link).into_iter().map(|m| m.address).collect()
    }

    fn meter_datagram(samples: &[i16]) -> Vec<u8> {
        let mut blob = (samples.len() as i32).to_le_bytes().to_vec();
        for s in samples {
            blob.extend_from_slice(&s.to_le_bytes());
        }
        codec::encode(DEFAULT_METER_BLOCK, &[Arg::Blob(blob)])
    }

    #[tokio::test]
    async fn start_subscribes_then_polls() {
        let (session, link) = session_with_mock();
        session.start().await.unwrap();

        let addrs = sent_addresses(&link);
        assert_eq!(addrs[0], "/meters");
        assert!(addrs.contains(&"/rtn/1/mix/fader".to_string()));
        assert!(addrs.contains(&"/rtn/4/mix/03/on".to_string()));
        assert!(addrs.contains(&"/bus/3/config/name".to_string()));
        // 4 returns x (fader, on, name, 3 buses) + 3 bus names.
        assert_eq!(addrs.len(), 1 + 4 * 6 + 3);
    }

    #[tokio::test]
    async fn full_poll_includes_registered_channels() {
        let (mut session, link) = session_with_mock();
        session.register_channel(5).await.unwrap();
        link.take_sent();

        session.poll_full().await.unwrap();
        let addrs = sent_addresses(&link);
        assert!(addrs.contains(&"/ch/05/mix/on".to_string()));
        assert!(addrs.contains(&"/ch/05/config/name".to_string()));
    }

    #[tokio::test]
    async fn register_channel_queries_mute_and_name() {
        let (mut session, link) = session_with_mock();
        assert!(session.register_channel(5).await.unwrap());
        assert_eq!(sent_addresses(&link), vec!["/ch/05/mix/on", "/ch/05/config/name"]);

        assert!(!session.register_channel(5).await.unwrap());
        assert_eq!(session.registry().channel_indices(), vec![5]);
    }

    #[tokio::test]
    async fn register_channel_out_of_range_sends_nothing() {
        let (mut session, link) = session_with_mock();
        assert!(session.register_channel(0).await.is_err());
        assert!(link.take_sent().is_empty());
    }

    #[tokio::test]
    async fn keepalive_renew_and_recover() {
        let (session, link) = session_with_mock();
        session.send_keepalive().await.unwrap();
        session.renew_meters().await.unwrap();
        assert_eq!(sent_addresses(&link), vec!["/xremote", "/renew"]);

        session.recover().await.unwrap();
        let msgs = sent_messages(&link);
        assert_eq!(msgs[0].address, "/xremote");
        assert_eq!(msgs[1].address, "/meters");
        assert_eq!(msgs[1].args[0], Arg::Str(DEFAULT_METER_BLOCK.into()));
    }

    #[tokio::test]
    async fn set_fader_clamps_and_echoes() {
        let (mut session, link) = session_with_mock();
        let echo = session.set_return_fader(2, 1.7).await.unwrap();
        assert_eq!(echo.fader, Some(1.0));
        assert_eq!(echo.target_index, 2);

        let msgs = sent_messages(&link);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].address, "/rtn/2/mix/fader");
        assert_eq!(msgs[0].args, vec![Arg::Float(1.0)]);
        assert_eq!(session.registry().return_target(2).unwrap().fader, Some(1.0));
    }

    #[tokio::test]
    async fn set_fader_rejects_bad_input_without_sending() {
        let (mut session, link) = session_with_mock();
        assert!(session.set_return_fader(1, f64::NAN).await.is_err());
        assert!(session.set_return_fader(1, f64::INFINITY).await.is_err());
        assert!(session.set_return_fader(5, 0.5).await.is_err());
        assert!(link.take_sent().is_empty());
    }

    #[tokio::test]
    async fn set_mute_writes_inverted_flag() {
        let (mut session, link) = session_with_mock();
        let echo = session.set_return_mute(1, true).await.unwrap();
        assert_eq!(echo.mute, Some(true));
        assert_eq!(sent_messages(&link)[0].args, vec![Arg::Int(0)]);
    }

    #[tokio::test]
    async fn set_bus_assignment() {
        let (mut session, link) = session_with_mock();
        let echo = session.set_return_bus(3, BusSlot::B, true).await.unwrap();
        assert_eq!(echo.bus_b, Some(true));
        let msgs = sent_messages(&link);
        assert_eq!(msgs[0].address, "/rtn/3/mix/02/on");
        assert_eq!(msgs[0].args, vec![Arg::Int(1)]);
    }

    #[tokio::test]
    async fn toggle_requires_known_mute_state() {
        let (mut session, link) = session_with_mock();
        assert!(session.toggle_channel_mute(5).await.is_err());

        session.register_channel(5).await.unwrap();
        assert!(session.toggle_channel_mute(5).await.is_err());
        link.take_sent();

        let reply = codec::encode("/ch/05/mix/on", &[Arg::Int(1)]);
        session.ingest(&reply, Instant::now());

        let echo = session.toggle_channel_mute(5).await.unwrap();
        assert_eq!(echo.muted, Some(true));
        let msgs = sent_messages(&link);
        assert_eq!(msgs[0].address, "/ch/05/mix/on");
        assert_eq!(msgs[0].args, vec![Arg::Int(0)]);
    }

    #[tokio::test]
    async fn send_failure_propagates_and_skips_registry() {
        let (mut session, link) = session_with_mock();
        link.set_fail_sends(true);
        assert!(session.set_return_fader(1, 0.5).await.is_err());
        assert_eq!(session.registry().return_target(1).unwrap().fader, None);
    }

    #[test]
    fn ingest_reports_only_changes() {
        let (mut session, _link) = session_with_mock();
        let reply = codec::encode("/rtn/1/mix/on", &[Arg::Int(1)]);

        let events = session.ingest(&reply, Instant::now());
        let mut expected = ReturnPatch::new(1);
        expected.mute = Some(false);
        assert_eq!(events, vec![ConsoleEvent::ReturnChanged(expected)]);

        assert!(session.ingest(&reply, Instant::now()).is_empty());
    }

    #[tokio::test]
    async fn ingest_channel_name_for_registered_channel() {
        let (mut session, _link) = session_with_mock();
        let reply = codec::encode("/ch/05/config/name", &[Arg::Str("Desk Mic".into())]);

        assert!(session.ingest(&reply, Instant::now()).is_empty());

        session.register_channel(5).await.unwrap();
        let events = session.ingest(&reply, Instant::now());
        let mut expected = ChannelPatch::new(5);
        expected.name = Some("Desk Mic".into());
        assert_eq!(events, vec![ConsoleEvent::ChannelChanged(expected)]);
    }

    #[test]
    fn ingest_bus_name() {
        let (mut session, _link) = session_with_mock();
        let reply = codec::encode("/bus/1/config/name", &[Arg::Str("Stage".into())]);
        let events = session.ingest(&reply, Instant::now());
        assert!(matches!(
            &events[..],
            [ConsoleEvent::BusNamesChanged(p)] if p.bus_a.as_deref() == Some("Stage")
        ));
    }

    #[test]
    fn ingest_garbage_is_not_a_reply() {
        let (mut session, _link) = session_with_mock();
        let now = Instant::now();
        assert!(session.ingest(b"garbage", now).is_empty());
        assert!(session.evaluate_liveness(now).is_none());
        assert_eq!(session.state(), LivenessState::Offline);
    }

    #[test]
    fn untracked_message_still_counts_as_reply() {
        let (mut session, _link) = session_with_mock();
        let now = Instant::now();
        let reply = codec::encode("/info", &[Arg::Str("V1".into())]);
        assert!(session.ingest(&reply, now).is_empty());
        let tr = session.evaluate_liveness(now).unwrap();
        assert_eq!(tr.to, LivenessState::Stale);
    }

    #[test]
    fn meter_frame_updates_returns_and_goes_live() {
        let (mut session, _link) = session_with_mock();
        let now = Instant::now();

        let mut samples = vec![i16::MIN; 26];
        // Return 1 pair (18, 19): right side louder at -45 dB.
        samples[18] = -60 * 256;
        samples[19] = -45 * 256;

        let events = session.ingest(&meter_datagram(&samples), now);
        let patch = events
            .iter()
            .find_map(|e| match e {
                ConsoleEvent::ReturnChanged(p) if p.target_index == 1 => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        assert!((patch.meter.unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(patch.signal_present, Some(true));

        let tr = session.evaluate_liveness(now).unwrap();
        assert_eq!(tr.to, LivenessState::Live);
    }

    #[tokio::test]
    async fn meter_frame_updates_registered_channels() {
        let (mut session, _link) = session_with_mock();
        session.register_channel(2).await.unwrap();

        let mut samples = vec![i16::MIN; 26];
        samples[1] = -30 * 256;
        let events = session.ingest(&meter_datagram(&samples), Instant::now());

        let channel = events
            .iter()
            .find_map(|e| match e {
                ConsoleEvent::ChannelChanged(p) => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(channel.target_index, 2);
        assert!((channel.meter.unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn short_meter_frame_skips_missing_strips() {
        let (mut session, _link) = session_with_mock();
        let events = session.ingest(&meter_datagram(&[0, 0, 0]), Instant::now());
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn scheduled_recovery_only_while_stale() {
        let (mut session, link) = session_with_mock();
        assert!(!session.run_scheduled_recovery().await.unwrap());
        assert!(link.take_sent().is_empty());

        let now = Instant::now();
        session.ingest(&codec::encode("/info", &[]), now);
        session.evaluate_liveness(now);
        assert!(session.run_scheduled_recovery().await.unwrap());
        assert_eq!(sent_addresses(&link), vec!["/xremote", "/meters"]);
    }
}
