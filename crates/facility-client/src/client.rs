//! Typed booking operations on top of a [`RequestChannel`].

use std::time::Duration;

use facility_core::{EpochSeconds, TimeSlot};
use facility_protocol::{Reply, Request};
use serde::Serialize;
use tokio::net::ToSocketAddrs;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::channel::{ChannelConfig, RequestChannel};
use crate::error::ClientResult;
use crate::monitor::{MonitorConfig, MonitorEvent, MonitorReport, MonitorSession};
use crate::transport::{DatagramTransport, UdpTransport};

/// Answer to a last-booking query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastBooking {
    /// End of the latest booking, `None` if the facility has none.
    pub end: Option<EpochSeconds>,
    pub message: String,
}

/// Answer to an extension request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extension {
    pub new_end: EpochSeconds,
    pub message: String,
}

/// Facility booking client.
pub struct FacilityClient<T = UdpTransport> {
    channel: RequestChannel<T>,
    monitor_config: MonitorConfig,
}

impl FacilityClient<UdpTransport> {
    pub async fn connect(server: impl ToSocketAddrs, config: ChannelConfig) -> ClientResult<Self> {
        Ok(Self::new(RequestChannel::connect(server, config).await?))
    }
}

impl<T: DatagramTransport> FacilityClient<T> {
    pub fn new(channel: RequestChannel<T>) -> Self {
        Self {
            channel,
            monitor_config: MonitorConfig::default(),
        }
    }

    pub fn with_monitor_config(mut self, config: MonitorConfig) -> Self {
        self.monitor_config = config;
        self
    }

    pub fn channel(&self) -> &RequestChannel<T> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut RequestChannel<T> {
        &mut self.channel
    }

    pub fn into_channel(self) -> RequestChannel<T> {
        self.channel
    }

    /// Free slots on each day offset (0 = today), in server order.
    pub async fn query_availability(
        &mut self,
        facility: &str,
        days: &[u32],
    ) -> ClientResult<Vec<TimeSlot>> {
        let request = Request::QueryAvailability {
            facility: facility.to_owned(),
            days: days.to_vec(),
        };
        let body = self.channel.call_body(&request).await?;
        Ok(Reply::decode_availability(&body)?)
    }

    /// Books `slot`, returning the new booking id.
    ///
    /// Retransmission after a lost reply may create a second booking.
    pub async fn book(&mut self, facility: &str, slot: TimeSlot) -> ClientResult<u32> {
        let request = Request::BookFacility {
            facility: facility.to_owned(),
            slot,
        };
        let body = self.channel.call_body(&request).await?;
        Ok(Reply::decode_booking_id(&body)?)
    }

    /// Shifts a booking by `offset_minutes` (negative moves it earlier).
    ///
    /// Not idempotent: if the reply is lost the retransmission may shift the
    /// booking again.
    pub async fn change_booking(
        &mut self,
        booking_id: u32,
        offset_minutes: i32,
    ) -> ClientResult<String> {
        let request = Request::ChangeBooking {
            booking_id,
            offset_minutes,
        };
        let body = self.channel.call_body(&request).await?;
        Ok(Reply::decode_message(&body)?)
    }

    pub async fn last_booking_time(&mut self, facility: &str) -> ClientResult<LastBooking> {
        let request = Request::GetLastBookingTime {
            facility: facility.to_owned(),
        };
        let body = self.channel.call_body(&request).await?;
        let (end, message) = Reply::decode_last_booking(&body)?;
        Ok(LastBooking { end, message })
    }

    /// Pushes a booking's end back by `minutes`.
    ///
    /// Not idempotent: if the reply is lost the retransmission may extend the
    /// booking twice.
    pub async fn extend_booking(&mut self, booking_id: u32, minutes: u32) -> ClientResult<Extension> {
        let request = Request::ExtendBooking {
            booking_id,
            minutes,
        };
        let body = self.channel.call_body(&request).await?;
        let (new_end, message) = Reply::decode_extension(&body)?;
        Ok(Extension { new_end, message })
    }

    /// Runs a monitor session on this client's channel. See
    /// [`MonitorSession::run`].
    pub async fn monitor<F>(
        &mut self,
        facility: &str,
        duration: Duration,
        cancel: watch::Receiver<bool>,
        on_event: F,
    ) -> ClientResult<MonitorReport>
    where
        F: FnMut(MonitorEvent),
    {
        MonitorSession::new(&mut self.channel, self.monitor_config.clone())
            .run(facility, duration, cancel, on_event)
            .await
    }
}

impl<T: DatagramTransport + 'static> FacilityClient<T> {
    /// Moves the client onto a worker task for the length of a monitor
    /// session. The client comes back through [`MonitorHandle::join`].
    pub fn spawn_monitor(self, facility: impl Into<String>, duration: Duration) -> MonitorHandle<T> {
        let facility = facility.into();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut client = self;
            let report = client
                .monitor(&facility, duration, cancel_rx, |event| {
                    let _ = event_tx.send(event);
                })
                .await;
            (client, report)
        });

        MonitorHandle {
            cancel: cancel_tx,
            events: event_rx,
            task,
        }
    }
}

/// Handle to a monitor session running on a worker task.
pub struct MonitorHandle<T> {
    cancel: watch::Sender<bool>,
    events: mpsc::UnboundedReceiver<MonitorEvent>,
    task: JoinHandle<(FacilityClient<T>, ClientResult<MonitorReport>)>,
}

impl<T> MonitorHandle<T> {
    /// Asks the session to stop. Any pending receive is abandoned.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Next event, or `None` once the session has finished.
    pub async fn next_event(&mut self) -> Option<MonitorEvent> {
        self.events.recv().await
    }

    /// Waits for the session to end and returns the client with the outcome.
    pub async fn join(self) -> ClientResult<(FacilityClient<T>, ClientResult<MonitorReport>)> {
        Ok(self.task.await?)
    }
}

#[cfg(test)]
mod tests {
    use facility_protocol::{
        MonitorUpdate, Operation, RequestEnvelope, ResponseEnvelope, Status, encode_error_body,
        encode_response,
    };
    use tokio::net::UdpSocket;

    use super::*;
    use crate::monitor::MonitorState;
    use crate::transport::scripted::ScriptedTransport;

    fn slot(start: u32, end: u32) -> TimeSlot {
        TimeSlot::new(start, end).unwrap()
    }

    /// Answers every request the way a healthy server would.
    fn reply_for(request: &Request) -> (Status, Vec<u8>) {
        let reply = match request {
            Request::QueryAvailability { facility, .. } if facility == "Conference_Room_A" => {
                Reply::Availability {
                    slots: vec![
                        slot(1_700_000_000, 1_700_003_600),
                        slot(1_700_010_000, 1_700_013_600),
                    ],
                }
            }
            Request::QueryAvailability { .. } => {
                return (Status::Error, encode_error_body("Facility not found").unwrap());
            }
            Request::BookFacility { .. } => Reply::Booked { booking_id: 1 },
            Request::ChangeBooking { .. } => Reply::Changed {
                message: "Booking changed successfully".into(),
            },
            Request::MonitorFacility { facility, .. } => Reply::MonitorRegistered {
                message: format!("Monitoring {facility}"),
            },
            Request::GetLastBookingTime { .. } => Reply::LastBookingTime {
                end: Some(1_700_003_600),
                message: "Last booking ends at 1700003600".into(),
            },
            Request::ExtendBooking { minutes, .. } => Reply::Extended {
                new_end: 1_700_003_600 + minutes * 60,
                message: "Booking extended successfully".into(),
            },
        };
        (Status::Success, reply.encode_body().unwrap())
    }

    fn respond(frame: &[u8]) -> Vec<u8> {
        let envelope = RequestEnvelope::decode(frame).unwrap();
        let request = Request::decode_body(envelope.message_type, &envelope.body).unwrap();
        let (status, body) = reply_for(&request);
        encode_response(envelope.request_id, status, &body)
    }

    async fn spawn_server() -> std::net::SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; facility_protocol::MAX_DATAGRAM_SIZE];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                let reply = respond(&buf[..len]);
                let _ = socket.send_to(&reply, from).await;
            }
        });
        addr
    }

    fn scripted_client() -> FacilityClient<ScriptedTransport> {
        let transport = ScriptedTransport::new(|frame| vec![respond(frame)]);
        FacilityClient::new(RequestChannel::new(transport, ChannelConfig::default()))
    }

    #[tokio::test]
    async fn query_returns_slots_in_order() {
        let addr = spawn_server().await;
        let mut client = FacilityClient::connect(addr, ChannelConfig::default())
            .await
            .unwrap();

        let slots = client
            .query_availability("Conference_Room_A", &[0, 1])
            .await
            .unwrap();

        assert_eq!(
            slots,
            vec![
                slot(1_700_000_000, 1_700_003_600),
                slot(1_700_010_000, 1_700_013_600),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_facility_is_protocol_error() {
        let addr = spawn_server().await;
        let mut client = FacilityClient::connect(addr, ChannelConfig::default())
            .await
            .unwrap();

        let err = client.query_availability("Nowhere", &[0]).await.unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(err.to_string(), "server error: Facility not found");
    }

    #[tokio::test]
    async fn typed_operations_decode_replies() {
        let mut client = scripted_client();

        assert_eq!(
            client
                .book("Lab_101", slot(1_700_000_000, 1_700_003_600))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            client.change_booking(1, -30).await.unwrap(),
            "Booking changed successfully"
        );
        assert_eq!(
            client.last_booking_time("Lab_101").await.unwrap(),
            LastBooking {
                end: Some(1_700_003_600),
                message: "Last booking ends at 1700003600".into()
            }
        );
        assert_eq!(
            client.extend_booking(1, 30).await.unwrap().new_end,
            1_700_005_400
        );
        assert_eq!(client.channel_mut().next_request_id(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_monitor_streams_and_cancels() {
        let transport = ScriptedTransport::new(|frame| vec![respond(frame)]);
        let inject = transport.injector();
        let client =
            FacilityClient::new(RequestChannel::new(transport, ChannelConfig::default()));

        let mut handle = client.spawn_monitor("Lab_101", Duration::from_secs(3_600));
        assert_eq!(
            handle.next_event().await,
            Some(MonitorEvent::Registered {
                message: "Monitoring Lab_101".into()
            })
        );

        let update = MonitorUpdate {
            status: Status::Success,
            message: "New booking created".into(),
            operation: Operation::Book,
            booking_id: 4,
            current: slot(1_700_000_000, 1_700_003_600),
            previous: None,
            availability: None,
        };
        let push = ResponseEnvelope::push(Status::Success, update.encode_body().unwrap()).encode();
        inject.send(push.clone()).unwrap();
        inject.send(push).unwrap();

        assert_eq!(handle.next_event().await, Some(MonitorEvent::Update(update)));
        handle.cancel();

        let (client, report) = handle.join().await.unwrap();
        let report = report.unwrap();
        assert_eq!(report.ended, MonitorState::Cancelled);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(client.channel().recv_timeout(), Duration::from_secs(3));
    }
}
