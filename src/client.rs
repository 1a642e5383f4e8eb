use crate::dispatch::SubscriptionHandle;
use crate::error::{LwrpError, Result};
use crate::protocol::{verb, Command, Frame, Topic};
use crate::session::{Session, SessionConfig};
use crate::types::{
    pin_mask, DestinationConfig, DeviceInfo, GpioState, IoDirection, LevelAlert, MeterReading,
    NetworkInfo, PinLevel, SourceConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};

/// Longest text command a GPIO channel accepts
const GPIO_TEXT_LIMIT: usize = 128;

/// Quiet gap after which a burst of full-table reply blocks is taken as
/// complete
const BULK_REPLY_GAP: Duration = Duration::from_millis(200);

/// High-level typed client for an LWRP device.
///
/// `LwrpClient` wraps a [`Session`] and expresses the common device
/// operations as typed calls: querying and routing sources and
/// destinations, driving GPIO pins, and configuring silence/clip alerts.
/// For anything it does not cover, drop down to [`LwrpClient::session`].
#[derive(Clone)]
pub struct LwrpClient {
    session: Arc<Session>,
}

impl LwrpClient {
    /// Connect to a device on the default LWRP port (93)
    pub async fn connect(host: impl Into<String>) -> Result<Self> {
        Ok(Self {
            session: Arc::new(Session::connect(host).await?),
        })
    }

    /// Connect with explicit session configuration
    pub async fn connect_with(host: impl Into<String>, config: SessionConfig) -> Result<Self> {
        Ok(Self {
            session: Arc::new(Session::connect_with(host, config).await?),
        })
    }

    /// The underlying session, for raw commands and snapshots
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Log in to the device. Required before non-query commands on devices
    /// with a password set.
    pub async fn login(&self, password: Option<&str>) -> Result<()> {
        self.session.login(None, password).await
    }

    /// Close the connection
    pub async fn stop(&self) {
        self.session.stop().await;
    }

    // ========== Queries ==========

    /// Core data about the device (name, versions, channel counts)
    pub async fn device_data(&self) -> Result<DeviceInfo> {
        let reply = self.session.issue(Command::new(verb::VER)).await?;
        DeviceInfo::try_from(reply.as_ref())
    }

    /// Network configuration. Devices split this across the IP and SET
    /// replies, so both are queried and merged.
    pub async fn network_data(&self) -> Result<NetworkInfo> {
        let ip = self.session.issue(Command::new(verb::IP)).await?;
        let mut info = NetworkInfo::try_from(ip.as_ref())?;

        let set = self.session.issue(Command::new(verb::SET)).await?;
        info.merge_frame(&set)?;
        Ok(info)
    }

    /// Source configuration for one channel
    pub async fn source_data(&self, channel: u32) -> Result<SourceConfig> {
        let reply = self
            .session
            .issue(Command::new(verb::SOURCE).with_key(channel.to_string()))
            .await?;
        SourceConfig::try_from(reply.as_ref())
    }

    /// Destination configuration for one channel
    pub async fn destination_data(&self, channel: u32) -> Result<DestinationConfig> {
        let reply = self
            .session
            .issue(Command::new(verb::DESTINATION).with_key(channel.to_string()))
            .await?;
        DestinationConfig::try_from(reply.as_ref())
    }

    /// GPI pin states for one channel
    pub async fn gpi_data(&self, channel: u32) -> Result<GpioState> {
        let reply = self
            .session
            .issue(Command::new(verb::GPI).with_key(channel.to_string()))
            .await?;
        GpioState::try_from(reply.as_ref())
    }

    /// GPO pin states for one channel
    pub async fn gpo_data(&self, channel: u32) -> Result<GpioState> {
        let reply = self
            .session
            .issue(Command::new(verb::GPO).with_key(channel.to_string()))
            .await?;
        GpioState::try_from(reply.as_ref())
    }

    /// Meter readings for one channel
    pub async fn meter_data(&self, io: IoDirection, channel: u32) -> Result<MeterReading> {
        let reply = self
            .session
            .issue(Command::new(verb::METER).with_key(format!("{} {channel}", io.wire_token())))
            .await?;
        MeterReading::try_from(reply.as_ref())
    }

    /// Source configuration for every channel. A bare `SOURCE` makes the
    /// device answer with one block per channel.
    pub async fn source_data_all(&self) -> Result<Vec<SourceConfig>> {
        let frames = self
            .collect_frames(Command::new(verb::SOURCE), Topic::SourceConfig, verb::SOURCE)
            .await?;
        Ok(Self::convert_all(&frames))
    }

    /// Destination configuration for every channel
    pub async fn destination_data_all(&self) -> Result<Vec<DestinationConfig>> {
        let frames = self
            .collect_frames(
                Command::new(verb::DESTINATION),
                Topic::DestinationConfig,
                verb::DESTINATION,
            )
            .await?;
        Ok(Self::convert_all(&frames))
    }

    /// GPI pin states for every channel. Issued as `ADD GPI`, which also
    /// enables change notifications for the GPIO topic.
    pub async fn gpi_data_all(&self) -> Result<Vec<GpioState>> {
        let frames = self
            .collect_frames(
                Command::new(verb::ADD).with_key(verb::GPI),
                Topic::Gpio,
                verb::GPI,
            )
            .await?;
        Ok(Self::convert_all(&frames))
    }

    /// GPO pin states for every channel, via `ADD GPO`
    pub async fn gpo_data_all(&self) -> Result<Vec<GpioState>> {
        let frames = self
            .collect_frames(
                Command::new(verb::ADD).with_key(verb::GPO),
                Topic::Gpio,
                verb::GPO,
            )
            .await?;
        Ok(Self::convert_all(&frames))
    }

    /// Meter readings for every channel in both directions
    pub async fn meter_data_all(&self) -> Result<Vec<MeterReading>> {
        let frames = self
            .collect_frames(Command::new(verb::METER), Topic::Generic, verb::METER)
            .await?;
        Ok(Self::convert_all(&frames))
    }

    /// Send a full-table query and gather the burst of reply blocks it
    /// triggers.
    ///
    /// The reply blocks carry per-channel keys, not an echo of the bare
    /// query, so they take the unsolicited path: each one lands in the
    /// cache and fans out on `topic`, where a temporary subscription
    /// collects it. The first block is awaited up to the command timeout;
    /// after that the burst is complete once the device stays quiet for
    /// [`BULK_REPLY_GAP`].
    async fn collect_frames(
        &self,
        command: Command,
        topic: Topic,
        reply_verb: &str,
    ) -> Result<Vec<Arc<Frame>>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<Frame>>();
        let handle = self.session.subscribe(topic, move |frame| {
            let _ = tx.send(frame);
        });
        let verb = command.verb().to_string();

        if let Err(e) = self.session.send(command).await {
            self.session.unsubscribe(&handle);
            return Err(e);
        }

        let deadline = Instant::now() + self.session.config().command_timeout;
        let mut frames = Vec::new();

        loop {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some(frame)) if frame.verb == reply_verb => {
                    frames.push(frame);
                    break;
                }
                // another verb sharing the topic, e.g. GPO pushes while
                // collecting GPI
                Ok(Some(_)) => continue,
                Ok(None) => {
                    self.session.unsubscribe(&handle);
                    return Err(LwrpError::ConnectionClosed);
                }
                Err(_) => {
                    self.session.unsubscribe(&handle);
                    return Err(LwrpError::Timeout { verb });
                }
            }
        }

        while let Ok(Some(frame)) = timeout(BULK_REPLY_GAP, rx.recv()).await {
            if frame.verb == reply_verb {
                frames.push(frame);
            }
        }

        self.session.unsubscribe(&handle);
        Ok(frames)
    }

    fn convert_all<T>(frames: &[Arc<Frame>]) -> Vec<T>
    where
        T: for<'a> TryFrom<&'a Frame, Error = LwrpError>,
    {
        frames
            .iter()
            .filter_map(|frame| match T::try_from(frame.as_ref()) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(verb = frame.verb.as_str(), "record skipped: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Ask the device to push GPI/GPO change notifications; pair with
    /// [`LwrpClient::on_gpio`]
    pub async fn enable_gpio_updates(&self) -> Result<()> {
        self.session
            .send(Command::new(verb::ADD).with_key(verb::GPI))
            .await?;
        self.session
            .send(Command::new(verb::ADD).with_key(verb::GPO))
            .await
    }

    // ========== Setters ==========

    /// Route a source channel to an RTP multicast address
    pub async fn set_source(&self, channel: u32, rtp_address: &str) -> Result<()> {
        self.session
            .send(
                Command::new(verb::SOURCE)
                    .with_key(channel.to_string())
                    .with_param("RTPA", rtp_address),
            )
            .await
    }

    /// Route a destination channel to a multicast address
    pub async fn set_destination(&self, channel: u32, address: &str) -> Result<()> {
        self.session
            .send(
                Command::new(verb::DESTINATION)
                    .with_key(channel.to_string())
                    .with_param("ADDR", address),
            )
            .await
    }

    /// Drive one GPO pin high or low, leaving the channel's other pins
    /// untouched
    pub async fn set_gpo(&self, channel: u32, pin: usize, level: PinLevel) -> Result<()> {
        self.set_pin(verb::GPO, channel, pin, level).await
    }

    /// Drive one GPI pin high or low
    pub async fn set_gpi(&self, channel: u32, pin: usize, level: PinLevel) -> Result<()> {
        self.set_pin(verb::GPI, channel, pin, level).await
    }

    async fn set_pin(&self, gpio_verb: &str, channel: u32, pin: usize, level: PinLevel) -> Result<()> {
        let mask = pin_mask(pin, level)?;
        self.session
            .send(
                Command::new(gpio_verb)
                    .with_key(channel.to_string())
                    .with_param("PINS", mask),
            )
            .await
    }

    /// Set the text command for a GPO channel (clamped to 128 characters)
    pub async fn set_gpo_text(&self, channel: u32, text: &str) -> Result<()> {
        self.set_text(verb::GPO, channel, text).await
    }

    /// Set the text command for a GPI channel (clamped to 128 characters)
    pub async fn set_gpi_text(&self, channel: u32, text: &str) -> Result<()> {
        self.set_text(verb::GPI, channel, text).await
    }

    async fn set_text(&self, gpio_verb: &str, channel: u32, text: &str) -> Result<()> {
        let text: String = text.chars().take(GPIO_TEXT_LIMIT).collect();
        self.session
            .send(
                Command::new(gpio_verb)
                    .with_key(channel.to_string())
                    .with_param("CMD", text),
            )
            .await
    }

    /// Configure the silence alert threshold for a channel; the device
    /// acknowledges with the resulting alert state
    pub async fn set_silence_threshold(
        &self,
        io: IoDirection,
        channel: u32,
        threshold_dbfs: i32,
        time_ms: u32,
    ) -> Result<LevelAlert> {
        self.set_level_threshold(io, channel, "LOW", threshold_dbfs, time_ms)
            .await
    }

    /// Configure the clipping alert threshold for a channel
    pub async fn set_clipping_threshold(
        &self,
        io: IoDirection,
        channel: u32,
        threshold_dbfs: i32,
        time_ms: u32,
    ) -> Result<LevelAlert> {
        self.set_level_threshold(io, channel, "CLIP", threshold_dbfs, time_ms)
            .await
    }

    async fn set_level_threshold(
        &self,
        io: IoDirection,
        channel: u32,
        kind: &str,
        threshold_dbfs: i32,
        time_ms: u32,
    ) -> Result<LevelAlert> {
        let reply = self
            .session
            .issue(
                Command::new(verb::LEVEL)
                    .with_key(format!("{} {channel}", io.wire_token()))
                    .with_param(format!("{kind}.LEVEL"), threshold_dbfs.to_string())
                    .with_param(format!("{kind}.TIME"), time_ms.to_string()),
            )
            .await?;
        LevelAlert::try_from(reply.as_ref())
    }

    // ========== Subscriptions ==========

    /// Subscribe to source configuration changes
    pub fn on_source(
        &self,
        callback: impl Fn(SourceConfig) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe_typed(Topic::SourceConfig, callback)
    }

    /// Subscribe to destination configuration changes
    pub fn on_destination(
        &self,
        callback: impl Fn(DestinationConfig) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe_typed(Topic::DestinationConfig, callback)
    }

    /// Subscribe to GPI/GPO pin changes
    pub fn on_gpio(
        &self,
        callback: impl Fn(GpioState) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe_typed(Topic::Gpio, callback)
    }

    /// Subscribe to silence/clip alerts
    pub fn on_level_alert(
        &self,
        callback: impl Fn(LevelAlert) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe_typed(Topic::LevelAlert, callback)
    }

    /// Subscribe to device error notifications
    pub fn on_error(
        &self,
        callback: impl Fn(Arc<Frame>) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.session.subscribe(Topic::Error, callback)
    }

    /// Remove a subscription created by any of the `on_*` helpers
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.session.unsubscribe(handle)
    }

    fn subscribe_typed<T>(
        &self,
        topic: Topic,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> SubscriptionHandle
    where
        T: for<'a> TryFrom<&'a Frame, Error = LwrpError>,
    {
        self.session.subscribe(topic, move |frame| {
            match T::try_from(frame.as_ref()) {
                Ok(record) => callback(record),
                Err(e) => tracing::warn!(verb = frame.verb.as_str(), "notification skipped: {}", e),
            }
        })
    }
}
