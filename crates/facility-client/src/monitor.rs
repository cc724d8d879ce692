//! Monitor sessions: register interest in a facility, then listen for pushes.
//!
//! ```text
//! Unregistered -> Registering -> Active -> Expired | Cancelled -> Closed
//!                     |
//!                     +-- error or timeout --> Closed
//! ```
//!
//! While active the session owns the receive side of the channel. It polls
//! with a short timeout, suppresses repeated pushes, and re-sends the
//! registration after too many silent polls in a row.

use std::collections::HashSet;
use std::time::Duration;

use facility_protocol::{
    DedupKey, MonitorUpdate, Reply, Request, ResponseEnvelope, Status, decode_error_body,
};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::channel::RequestChannel;
use crate::error::{ClientError, ClientResult};
use crate::transport::DatagramTransport;

/// Default wait per poll while listening.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of silent polls in a row before re-registering.
pub const DEFAULT_LIVENESS_THRESHOLD: u32 = 10;

/// Listening settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Receive timeout while active; keep it well below the request timeout.
    pub poll_interval: Duration,
    /// Consecutive empty polls that trigger a re-registration. Zero disables
    /// re-registration.
    pub liveness_threshold: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            liveness_threshold: DEFAULT_LIVENESS_THRESHOLD,
        }
    }
}

impl MonitorConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_liveness_threshold(mut self, threshold: u32) -> Self {
        self.liveness_threshold = threshold;
        self
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.poll_interval.is_zero() {
            return Err(ClientError::Config("poll interval must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Unregistered,
    Registering,
    Active,
    Expired,
    Cancelled,
    Closed,
}

/// Something the caller should know about while the session runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Registration accepted; carries the server's confirmation text.
    Registered { message: String },
    /// A push not seen before in this session.
    Update(MonitorUpdate),
    /// The liveness heuristic re-sent the registration.
    Reregistered { acknowledged: bool },
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    /// `Expired` or `Cancelled`.
    pub ended: MonitorState,
    pub delivered: usize,
    pub duplicates: usize,
    pub malformed: usize,
    /// Datagrams that were not success pushes.
    pub ignored: usize,
    pub reregistrations: usize,
}

/// One monitoring invocation over a borrowed channel.
pub struct MonitorSession<'a, T> {
    channel: &'a mut RequestChannel<T>,
    config: MonitorConfig,
    state: MonitorState,
    filter: PushFilter,
    consecutive_timeouts: u32,
    reregistrations: usize,
}

/// Decodes incoming datagrams and suppresses repeats.
#[derive(Debug, Default)]
struct PushFilter {
    seen: HashSet<DedupKey>,
    delivered: usize,
    duplicates: usize,
    malformed: usize,
    ignored: usize,
}

impl<'a, T: DatagramTransport> MonitorSession<'a, T> {
    pub fn new(channel: &'a mut RequestChannel<T>, config: MonitorConfig) -> Self {
        Self {
            channel,
            config,
            state: MonitorState::Unregistered,
            filter: PushFilter::default(),
            consecutive_timeouts: 0,
            reregistrations: 0,
        }
    }

    /// Registers for `facility` and listens until `duration` elapses or
    /// `cancel` turns true.
    ///
    /// Cancellation and the end of `duration` interrupt any pending receive,
    /// including a liveness re-registration. `duration` is sent to the server
    /// rounded up to whole seconds. Registration failures end the session
    /// with [`ClientError::Registration`]; bad pushes never do.
    pub async fn run<F>(
        mut self,
        facility: &str,
        duration: Duration,
        cancel: watch::Receiver<bool>,
        mut on_event: F,
    ) -> ClientResult<MonitorReport>
    where
        F: FnMut(MonitorEvent),
    {
        self.config.validate()?;
        let request = Request::MonitorFacility {
            facility: facility.to_owned(),
            duration_secs: wire_duration_secs(duration)?,
        };
        let frame = request.frame(self.channel.next_request_id())?;

        self.transition(MonitorState::Registering);
        let message = match self.register(&frame).await {
            Ok(message) => message,
            Err(err) => {
                self.transition(MonitorState::Closed);
                return Err(ClientError::Registration(Box::new(err)));
            }
        };
        info!(facility, ?duration, %message, "monitor registered");
        on_event(MonitorEvent::Registered { message });

        self.transition(MonitorState::Active);
        let ended = self
            .listen(&frame, duration, cancel, &mut on_event)
            .await;
        let ended = match ended {
            Ok(ended) => ended,
            Err(err) => {
                self.transition(MonitorState::Closed);
                return Err(err);
            }
        };
        self.transition(ended);

        let report = MonitorReport {
            ended,
            delivered: self.filter.delivered,
            duplicates: self.filter.duplicates,
            malformed: self.filter.malformed,
            ignored: self.filter.ignored,
            reregistrations: self.reregistrations,
        };
        self.transition(MonitorState::Closed);
        info!(
            facility,
            delivered = report.delivered,
            duplicates = report.duplicates,
            reregistrations = report.reregistrations,
            "monitor closed"
        );
        Ok(report)
    }

    fn transition(&mut self, next: MonitorState) {
        debug!(from = ?self.state, to = ?next, "monitor state");
        self.state = next;
    }

    async fn register(&mut self, frame: &[u8]) -> ClientResult<String> {
        let datagram = self.channel.exchange(frame).await?;
        let response = ResponseEnvelope::decode(&datagram)?;
        match response.status {
            Status::Success => Ok(Reply::decode_message(&response.body)?),
            Status::Error => Err(ClientError::Protocol {
                message: decode_error_body(&response.body)?,
            }),
        }
    }

    async fn listen<F>(
        &mut self,
        frame: &[u8],
        duration: Duration,
        mut cancel: watch::Receiver<bool>,
        on_event: &mut F,
    ) -> ClientResult<MonitorState>
    where
        F: FnMut(MonitorEvent),
    {
        let poll_interval = self.config.poll_interval;
        let threshold = self.config.liveness_threshold;
        let deadline = Instant::now() + duration;
        let mut channel = self.channel.override_recv_timeout(poll_interval);

        loop {
            if *cancel.borrow() {
                return Ok(MonitorState::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(MonitorState::Expired);
            }

            let wait = poll_interval.min(deadline - now);
            let received = tokio::select! {
                () = cancelled(&mut cancel) => return Ok(MonitorState::Cancelled),
                received = channel.recv_datagram_within(wait) => received?,
            };
            if let Some(datagram) = received {
                self.consecutive_timeouts = 0;
                self.filter.handle(&datagram, on_event);
                continue;
            }

            self.consecutive_timeouts += 1;
            if threshold == 0 || self.consecutive_timeouts < threshold {
                continue;
            }
            warn!(
                silent_polls = self.consecutive_timeouts,
                "no traffic, re-sending registration"
            );
            // Runs under the poll timeout while the guard is in place, and
            // never past the session deadline.
            let outcome = tokio::select! {
                () = cancelled(&mut cancel) => return Ok(MonitorState::Cancelled),
                outcome = timeout_at(deadline, channel.exchange(frame)) => outcome,
            };
            let acknowledged = match outcome {
                Ok(Ok(datagram)) => self.filter.handle_reregistration_reply(&datagram, on_event),
                Ok(Err(err)) => {
                    warn!(%err, "re-registration got no answer");
                    false
                }
                Err(_) => {
                    debug!("session ended during re-registration");
                    false
                }
            };
            self.reregistrations += 1;
            self.consecutive_timeouts = 0;
            on_event(MonitorEvent::Reregistered { acknowledged });
        }
    }
}

/// Resolves once `cancel` turns true. Never resolves if the sender is gone
/// without having cancelled.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let closed = cancel.wait_for(|flag| *flag).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// Session length as sent on the wire, rounded up to whole seconds.
fn wire_duration_secs(duration: Duration) -> ClientResult<u32> {
    let secs = duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0));
    u32::try_from(secs).map_err(|_| {
        ClientError::Config(format!(
            "monitor duration of {secs}s does not fit the protocol's 32-bit field"
        ))
    })
}

impl PushFilter {
    /// A push can beat the registration reply; treat it as one. Returns
    /// true only for a success reply to the registration itself.
    fn handle_reregistration_reply<F>(&mut self, datagram: &[u8], on_event: &mut F) -> bool
    where
        F: FnMut(MonitorEvent),
    {
        match ResponseEnvelope::decode(datagram) {
            Ok(response) if response.is_push() => {
                self.handle(datagram, on_event);
                false
            }
            Ok(response) => {
                debug!(status = ?response.status, "re-registration answered");
                response.status == Status::Success
            }
            Err(err) => {
                self.malformed += 1;
                warn!(%err, "malformed re-registration reply");
                false
            }
        }
    }

    fn handle<F>(&mut self, datagram: &[u8], on_event: &mut F)
    where
        F: FnMut(MonitorEvent),
    {
        let response = match ResponseEnvelope::decode(datagram) {
            Ok(response) => response,
            Err(err) => {
                self.malformed += 1;
                warn!(%err, len = datagram.len(), "skipping malformed datagram");
                return;
            }
        };
        if !response.is_push() || response.status != Status::Success {
            self.ignored += 1;
            debug!(
                request_id = response.request_id,
                status = ?response.status,
                "ignoring non-update datagram"
            );
            return;
        }

        let update = match MonitorUpdate::decode_body(response.status, &response.body) {
            Ok(update) => update,
            Err(err) => {
                self.malformed += 1;
                warn!(%err, "skipping malformed push");
                return;
            }
        };
        if !self.seen.insert(update.dedup_key()) {
            self.duplicates += 1;
            debug!(booking_id = update.booking_id, "duplicate push suppressed");
            return;
        }
        self.delivered += 1;
        info!(
            booking_id = update.booking_id,
            operation = ?update.operation,
            "monitor update"
        );
        on_event(MonitorEvent::Update(update));
    }
}
