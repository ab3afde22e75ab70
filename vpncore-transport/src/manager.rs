use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UdpSocket;
use tracing::{info, warn};

use vpncore_packet::{Origin, Packet, Queue, QueuePolicy};

use crate::datagram::{DatagramTransport, HandshakeReply};
use crate::error::TransportError;
use crate::stream::StreamTransport;
use crate::Transport;

/// Tunables governing the manager's packet queues and per-source fairness
/// budget (spec §4.5); defaults match the spec's literal values.
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    pub per_source_budget: usize,
    pub outbound_queue_depth: usize,
    pub inbound_queue_depth: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { per_source_budget: 32, outbound_queue_depth: 256, inbound_queue_depth: 256 }
    }
}

/// Manager lifecycle states (spec §4.5), verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Init,
    StreamConnecting,
    StreamEstablished,
    DatagramProbing,
    DatagramEstablished,
    Running,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTransport {
    Stream,
    Datagram,
}

pub enum ManagerEvent {
    /// A complete, still-framed PPP frame from whichever transport
    /// delivered it (not necessarily the currently-active one, since the
    /// stream stays subscribed for liveness signaling even once demoted
    /// from data duty).
    Frame(ActiveTransport, Vec<u8>),
    DatagramPromoted,
    DatagramDemoted,
    StreamLost,
}

/// How long `connect` waits for an HTTP rejection after the tunnel-start
/// request before assuming the gateway went straight to framed PPP traffic.
const REJECTION_PEEK_TIMEOUT: Duration = Duration::from_millis(300);

/// Owns the stream transport (always present) and an optional datagram
/// transport, and enforces the invariant that at most one of them carries
/// outbound data traffic at any instant (spec invariant 6, §8).
pub struct TransportManager<S> {
    stream: StreamTransport<S>,
    datagram: Option<DatagramTransport>,
    state: ManagerState,
    active: ActiveTransport,
    per_source_budget: usize,
    outbound: Queue,
    inbound: Queue,
}

impl<S> TransportManager<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: StreamTransport<S>) -> Self {
        Self::with_config(stream, ManagerConfig::default())
    }

    pub fn with_config(stream: StreamTransport<S>, config: ManagerConfig) -> Self {
        Self {
            stream,
            datagram: None,
            state: ManagerState::Init,
            active: ActiveTransport::Stream,
            per_source_budget: config.per_source_budget,
            outbound: Queue::new(config.outbound_queue_depth, QueuePolicy::Backpressure),
            inbound: Queue::new(config.inbound_queue_depth, QueuePolicy::Backpressure),
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn active(&self) -> ActiveTransport {
        self.active
    }

    pub fn per_source_budget(&self) -> usize {
        self.per_source_budget
    }

    pub async fn connect(&mut self, tunnel_request: &[u8]) -> Result<(), TransportError> {
        self.state = ManagerState::StreamConnecting;
        self.stream.send_tunnel_request(tunnel_request).await?;
        if let Some(status_line) = self.stream.peek_rejection(REJECTION_PEEK_TIMEOUT).await? {
            return Err(TransportError::StreamRejected(status_line));
        }
        self.state = ManagerState::StreamEstablished;
        Ok(())
    }

    /// Runs the datagram handshake over an already-bound (and, for DTLS
    /// dialects, already-secured) socket. On success the datagram
    /// transport becomes the active one immediately; any failure leaves
    /// the stream transport untouched and active.
    ///
    /// Returns `Some(frame)` when the server's `ok` reply was lost and a
    /// PPP frame arrived in its place — the caller must still deliver that
    /// frame to the PPP engine as the first inbound datagram frame.
    pub async fn probe_datagram(&mut self, socket: UdpSocket, cookie: &[u8], timeout: Duration) -> Option<Vec<u8>> {
        self.state = ManagerState::DatagramProbing;
        let mut dgram = DatagramTransport::new(socket);
        match dgram.handshake(cookie, timeout).await {
            Ok(HandshakeReply::Ok) => {
                info!("datagram transport established");
                self.promote(dgram);
                None
            }
            Ok(HandshakeReply::PppFrame(first_frame)) => {
                info!("datagram transport established (ok reply lost, ppp frame observed instead)");
                self.promote(dgram);
                Some(first_frame)
            }
            Ok(HandshakeReply::Fail) | Err(_) => {
                warn!("datagram handshake failed or timed out; remaining on stream transport");
                self.state = ManagerState::StreamEstablished;
                None
            }
        }
    }

    fn promote(&mut self, dgram: DatagramTransport) {
        self.datagram = Some(dgram);
        self.active = ActiveTransport::Datagram;
        self.state = ManagerState::DatagramEstablished;
    }

    /// Falls back to the stream transport after a datagram failure. PPP
    /// state survives; the torn-down datagram crypto context does not —
    /// a later retry needs fresh keying material.
    pub fn demote(&mut self) {
        self.datagram = None;
        self.active = ActiveTransport::Stream;
        if self.state != ManagerState::Closing && self.state != ManagerState::Closed {
            self.state = ManagerState::Running;
        }
    }

    pub fn enter_running(&mut self) {
        if self.state != ManagerState::Closing && self.state != ManagerState::Closed {
            self.state = ManagerState::Running;
        }
    }

    /// Queues `frame` for the active transport and flushes the outbound
    /// queue. Per spec §4.5 the loop never blocks on writes: a `WouldBlock`
    /// leaves the frame at the head of the queue and the call waits on the
    /// transport's writable readiness instead of failing the send.
    pub async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let origin = match self.active {
            ActiveTransport::Stream => Origin::Stream,
            ActiveTransport::Datagram => Origin::Datagram,
        };
        let packet = Packet::from_payload(origin, frame).ok_or(TransportError::Oversized)?;
        self.outbound.try_push(packet).map_err(|_| TransportError::WouldBlock)?;
        self.flush_outbound().await
    }

    /// Drains the outbound queue front-to-back. A demoted datagram
    /// transport re-sends the same still-queued frame on the stream
    /// transport rather than dropping it.
    async fn flush_outbound(&mut self) -> Result<(), TransportError> {
        while let Some(pkt) = self.outbound.front() {
            let bytes = pkt.payload().to_vec();
            let result = match self.active {
                ActiveTransport::Stream => self.stream.send(&bytes).await,
                ActiveTransport::Datagram => match self.datagram.as_mut() {
                    Some(dgram) => dgram.send(&bytes).await,
                    None => self.stream.send(&bytes).await,
                },
            };
            match result {
                Ok(()) => {
                    self.outbound.pop();
                }
                Err(TransportError::WouldBlock) => match self.active {
                    ActiveTransport::Datagram => {
                        if let Some(dgram) = self.datagram.as_mut() {
                            dgram.writable().await?;
                        }
                    }
                    ActiveTransport::Stream => self.stream.writable().await?,
                },
                Err(TransportError::Closed) if self.active == ActiveTransport::Datagram => {
                    self.demote();
                }
                Err(e) => {
                    self.outbound.pop();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Waits for the next inbound frame from whichever transport is
    /// readable first (spec §4.5's readiness-driven event loop, expressed
    /// as a `select!` rather than manual poll/readiness bookkeeping), then
    /// drains a per-source-budgeted burst of any further already-buffered
    /// datagrams into the inbound queue before returning the first one.
    pub async fn recv(&mut self) -> ManagerEvent {
        loop {
            if let Some(pkt) = self.inbound.pop() {
                return Self::frame_event(pkt);
            }

            enum Outcome {
                Stream(Result<Vec<u8>, TransportError>),
                Datagram(Result<Vec<u8>, TransportError>),
            }

            let outcome = {
                let Self { stream, datagram, .. } = self;
                if let Some(dgram) = datagram.as_mut() {
                    tokio::select! {
                        r = stream.recv() => Outcome::Stream(r),
                        r = dgram.recv() => Outcome::Datagram(r),
                    }
                } else {
                    Outcome::Stream(stream.recv().await)
                }
            };

            match outcome {
                Outcome::Stream(Ok(bytes)) => self.enqueue_inbound(Origin::Stream, bytes),
                Outcome::Stream(Err(_)) => return ManagerEvent::StreamLost,
                Outcome::Datagram(Ok(bytes)) => {
                    self.enqueue_inbound(Origin::Datagram, bytes);
                    self.drain_datagram_burst();
                }
                Outcome::Datagram(Err(_)) => {
                    self.demote();
                    return ManagerEvent::DatagramDemoted;
                }
            }
            // Loop back: the frame(s) just enqueued (barring a dropped
            // oversized/over-budget anomaly) are picked up on the next
            // iteration rather than read from the transport again.
        }
    }

    fn frame_event(pkt: Packet) -> ManagerEvent {
        let active = match pkt.origin {
            Origin::Datagram => ActiveTransport::Datagram,
            _ => ActiveTransport::Stream,
        };
        ManagerEvent::Frame(active, pkt.payload().to_vec())
    }

    fn enqueue_inbound(&mut self, origin: Origin, bytes: Vec<u8>) {
        let Some(pkt) = Packet::from_payload(origin, &bytes) else {
            warn!(len = bytes.len(), "dropping inbound frame too large for the packet buffer");
            return;
        };
        if self.inbound.try_push(pkt).is_err() {
            warn!("inbound queue full; dropping frame");
        }
    }

    /// Up to `per_source_budget - 1` further datagrams already sitting in
    /// the socket's receive buffer, read without waiting, so one readable
    /// datagram socket can't starve the stream side of the next `recv`.
    fn drain_datagram_burst(&mut self) {
        let mut extra = Vec::new();
        if let Some(dgram) = self.datagram.as_mut() {
            for _ in 1..self.per_source_budget {
                match dgram.try_recv_burst() {
                    Some(bytes) => extra.push(bytes),
                    None => break,
                }
            }
        }
        for bytes in extra {
            self.enqueue_inbound(Origin::Datagram, bytes);
        }
    }

    /// Tears down both transports. Per spec §5: datagram first (no
    /// drain needed), then stream. In-flight outbound packets are dropped;
    /// anything already buffered inbound is left for the caller to drain
    /// via `recv` until it reports the loss.
    pub async fn close(&mut self) {
        self.state = ManagerState::Closing;
        self.outbound.drain_and_drop();
        if let Some(mut dgram) = self.datagram.take() {
            dgram.close().await;
        }
        self.stream.close().await;
        self.state = ManagerState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpncore_framing::LengthPrefixedFramer;

    fn framer() -> LengthPrefixedFramer {
        LengthPrefixedFramer::new(vec![0x50, 0x50], 1500)
    }

    #[tokio::test]
    async fn starts_on_stream_and_reports_states() {
        let (client, _server) = tokio::io::duplex(64);
        let transport = StreamTransport::new(client, framer());
        let manager = TransportManager::new(transport);
        assert_eq!(manager.active(), ActiveTransport::Stream);
        assert_eq!(manager.state(), ManagerState::Init);
    }

    #[tokio::test]
    async fn demote_falls_back_to_stream() {
        let (client, _server) = tokio::io::duplex(64);
        let transport = StreamTransport::new(client, framer());
        let mut manager = TransportManager::new(transport);
        manager.enter_running();
        manager.active = ActiveTransport::Datagram;
        manager.state = ManagerState::DatagramEstablished;
        manager.demote();
        assert_eq!(manager.active(), ActiveTransport::Stream);
        assert_eq!(manager.state(), ManagerState::Running);
    }

    #[tokio::test]
    async fn connect_reports_an_http_rejection_instead_of_hanging() {
        use tokio::io::AsyncWriteExt;

        let (client, mut server) = tokio::io::duplex(256);
        let transport = StreamTransport::new(client, framer());
        let mut manager = TransportManager::new(transport);

        let writer = tokio::spawn(async move {
            server.write_all(b"HTTP/1.1 401 Unauthorized\r\n\r\n").await.unwrap();
        });

        let err = manager.connect(b"CONNECT x\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, TransportError::StreamRejected(status) if status == "HTTP/1.1 401 Unauthorized"));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn send_enqueues_and_flushes_through_the_outbound_queue() {
        let (client, mut server) = tokio::io::duplex(1 << 16);
        let transport = StreamTransport::new(client, framer());
        let mut manager = TransportManager::new(transport);
        manager.enter_running();

        let frame = framer().encode(0x0021, b"hello");
        manager.send(&frame).await.unwrap();

        let mut buf = vec![0u8; frame.len()];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut buf).await.unwrap();
        assert_eq!(buf, frame);
    }
}
