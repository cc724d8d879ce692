//! At-least-once request/response exchange over an unreliable transport.
//!
//! Each request is framed once and the same bytes are retransmitted on
//! every attempt. A reply that arrives after its attempt timed out can be
//! mistaken for the reply to a later request; enable
//! [`ChannelConfig::match_request_id`] to discard datagrams whose id does
//! not match.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use facility_protocol::{
    MAX_DATAGRAM_SIZE, Reply, Request, ResponseEnvelope, Status, decode_error_body,
    peek_request_id,
};
use tokio::net::ToSocketAddrs;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::transport::{DatagramTransport, UdpTransport};

/// Default attempts per request.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default wait per attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Retry, timeout and fault injection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Total attempts, including the first.
    pub retries: u32,
    /// Wait per attempt. Also the baseline receive timeout.
    pub timeout: Duration,
    /// Probability in `[0, 1]` that an attempt skips the actual send.
    pub drop_rate: f64,
    /// Discard replies whose request id differs from the one sent.
    pub match_request_id: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            drop_rate: 0.0,
            match_request_id: false,
        }
    }
}

impl ChannelConfig {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_drop_rate(mut self, drop_rate: f64) -> Self {
        self.drop_rate = drop_rate;
        self
    }

    pub fn with_match_request_id(mut self, enabled: bool) -> Self {
        self.match_request_id = enabled;
        self
    }

    /// Rejects settings that would make every request fail or never finish.
    pub fn validate(&self) -> ClientResult<()> {
        if self.retries == 0 {
            return Err(ClientError::Config("retries must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must be positive".into()));
        }
        validate_drop_rate(self.drop_rate)?;
        Ok(())
    }
}

/// Checks that a drop probability lies in `[0, 1]`.
pub fn validate_drop_rate(drop_rate: f64) -> ClientResult<()> {
    if (0.0..=1.0).contains(&drop_rate) {
        Ok(())
    } else {
        Err(ClientError::Config(format!(
            "drop rate must be between 0.0 and 1.0, got {drop_rate}"
        )))
    }
}

/// Owns the transport and the request id counter of one client.
pub struct RequestChannel<T = UdpTransport> {
    transport: T,
    config: ChannelConfig,
    next_id: u32,
    recv_timeout: Duration,
    buf: Vec<u8>,
}

impl RequestChannel<UdpTransport> {
    /// Binds a UDP socket for talking to `server`.
    pub async fn connect(server: impl ToSocketAddrs, config: ChannelConfig) -> ClientResult<Self> {
        config.validate()?;
        let transport = UdpTransport::connect(server).await?;
        Ok(Self::new(transport, config))
    }
}

impl<T> RequestChannel<T> {
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current per-attempt wait used by [`Self::exchange`] and
    /// [`Self::recv_datagram`].
    pub fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    /// Allocates the next request id. Ids start at 1 and skip 0, which is
    /// reserved for pushes.
    ///
    /// After `u32::MAX` the counter wraps back to 1, so a channel that sends
    /// more than four billion requests reuses ids. A late reply to the old
    /// request could then pass the strict id check.
    pub fn next_request_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        id
    }

    /// Swaps the receive timeout until the guard drops.
    pub fn override_recv_timeout(&mut self, timeout: Duration) -> RecvTimeoutGuard<'_, T> {
        let baseline = self.config.timeout;
        debug!(?timeout, ?baseline, "overriding receive timeout");
        self.recv_timeout = timeout;
        RecvTimeoutGuard {
            channel: self,
            baseline,
        }
    }

    fn should_drop(&self) -> bool {
        self.config.drop_rate > 0.0 && rand::random::<f64>() < self.config.drop_rate
    }
}

impl<T: DatagramTransport> RequestChannel<T> {
    pub fn new(transport: T, config: ChannelConfig) -> Self {
        Self {
            transport,
            recv_timeout: config.timeout,
            config,
            next_id: 1,
            buf: vec![0; MAX_DATAGRAM_SIZE],
        }
    }

    /// Sends `frame` up to `retries` times, returning the first datagram that
    /// arrives within an attempt's `timeout`.
    pub async fn send_request(
        &mut self,
        frame: &[u8],
        retries: u32,
        timeout: Duration,
    ) -> ClientResult<Vec<u8>> {
        let expected = if self.config.match_request_id {
            Some(peek_request_id(frame)?)
        } else {
            None
        };

        for attempt in 1..=retries {
            if self.should_drop() {
                debug!(attempt, retries, "simulated drop, not sending");
            } else {
                self.transport.send(frame).await?;
                debug!(attempt, retries, len = frame.len(), "request sent");
            }

            let deadline = Instant::now() + timeout;
            if let Some(datagram) = self.recv_until(deadline, expected).await? {
                return Ok(datagram);
            }
            warn!(attempt, retries, ?timeout, "no response, retransmitting");
        }

        warn!(retries, "request timed out after all retries");
        Err(ClientError::Timeout {
            attempts: retries,
            timeout,
        })
    }

    /// [`Self::send_request`] with the configured retries and the current
    /// receive timeout.
    pub async fn exchange(&mut self, frame: &[u8]) -> ClientResult<Vec<u8>> {
        self.send_request(frame, self.config.retries, self.recv_timeout)
            .await
    }

    /// Frames `request` with a fresh id, exchanges it, and returns the body
    /// of a success reply.
    ///
    /// An error status becomes [`ClientError::Protocol`] and is not retried.
    pub async fn call_body(&mut self, request: &Request) -> ClientResult<Vec<u8>> {
        let request_id = self.next_request_id();
        let frame = request.frame(request_id)?;
        debug!(request_id, message_type = ?request.message_type(), "calling");

        let datagram = self.exchange(&frame).await?;
        let response = ResponseEnvelope::decode(&datagram)?;
        if response.request_id != request_id {
            debug!(
                expected = request_id,
                received = response.request_id,
                "response request_id mismatch"
            );
        }

        match response.status {
            Status::Success => Ok(response.body),
            Status::Error => {
                let message = decode_error_body(&response.body)?;
                debug!(request_id, %message, "server rejected request");
                Err(ClientError::Protocol { message })
            }
        }
    }

    /// [`Self::call_body`], decoded as the reply to `request`.
    pub async fn call(&mut self, request: &Request) -> ClientResult<Reply> {
        let body = self.call_body(request).await?;
        Ok(Reply::decode_body(request.message_type(), &body)?)
    }

    /// Waits up to the current receive timeout for any datagram.
    pub async fn recv_datagram(&mut self) -> ClientResult<Option<Vec<u8>>> {
        self.recv_datagram_within(self.recv_timeout).await
    }

    /// Waits up to `wait` for any datagram.
    pub async fn recv_datagram_within(&mut self, wait: Duration) -> ClientResult<Option<Vec<u8>>> {
        self.recv_until(Instant::now() + wait, None).await
    }

    async fn recv_until(
        &mut self,
        deadline: Instant,
        expected: Option<u32>,
    ) -> ClientResult<Option<Vec<u8>>> {
        loop {
            let len = match timeout_at(deadline, self.transport.recv(&mut self.buf)).await {
                Ok(received) => received?,
                Err(_) => return Ok(None),
            };
            let datagram = &self.buf[..len];
            let Some(expected) = expected else {
                return Ok(Some(datagram.to_vec()));
            };
            match peek_request_id(datagram) {
                Ok(id) if id == expected => return Ok(Some(datagram.to_vec())),
                Ok(id) => debug!(expected, received = id, "discarding uncorrelated datagram"),
                Err(err) => debug!(%err, "discarding runt datagram"),
            }
        }
    }
}

/// Restores the channel's baseline receive timeout on drop.
pub struct RecvTimeoutGuard<'a, T> {
    channel: &'a mut RequestChannel<T>,
    baseline: Duration,
}

impl<T> Deref for RecvTimeoutGuard<'_, T> {
    type Target = RequestChannel<T>;

    fn deref(&self) -> &Self::Target {
        self.channel
    }
}

impl<T> DerefMut for RecvTimeoutGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.channel
    }
}

impl<T> Drop for RecvTimeoutGuard<'_, T> {
    fn drop(&mut self) {
        self.channel.recv_timeout = self.baseline;
        debug!(baseline = ?self.baseline, "receive timeout restored");
    }
}
