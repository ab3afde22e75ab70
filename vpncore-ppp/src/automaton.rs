use std::time::{Duration, Instant};

use crate::control::{Code, ControlPacket};
use crate::negotiator::{Negotiator, ReplyCode};

/// Per-sub-protocol state, exactly the seven named in the spec's data
/// model (a deliberately reduced view of RFC 1661's full automaton — no
/// `Stopped`/`Stopping` distinction, since this client never needs to stay
/// open while administratively down across a lower-layer bounce).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubState {
    Closed,
    Starting,
    ReqSent,
    AckReceived,
    AckSent,
    Opened,
    Terminating,
}

#[derive(Debug, Clone)]
pub enum AEvent {
    Open,
    Close,
    Up,
    Down,
    RecvConfigureRequest { identifier: u8, options: Vec<(u8, Vec<u8>)> },
    RecvConfigureAck { identifier: u8, options: Vec<(u8, Vec<u8>)> },
    RecvConfigureNak { identifier: u8, options: Vec<(u8, Vec<u8>)> },
    RecvConfigureReject { identifier: u8, options: Vec<(u8, Vec<u8>)> },
    RecvTerminateRequest,
    RecvTerminateAck,
    Tick(Instant),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AOutput {
    /// A control packet ready to hand to the framer, tagged with the
    /// owning sub-protocol's PPP protocol number.
    Send(u16, Vec<u8>),
    Opened,
    Closed,
    TimedOut,
}

/// Retransmissions on Terminate-Request back off the same way Configure-Request
/// does; this is the attempt count its deadline backs off against (`Close`
/// gives it two retries before giving up).
const TERMINATE_RETRIES: u32 = 2;

/// Exponential-backoff shift is capped so a large Max-Configure doesn't turn
/// the restart timer into a multi-hour wait.
const MAX_BACKOFF_SHIFT: u32 = 5;

pub struct Automaton<N: Negotiator> {
    pub negotiator: N,
    state: SubState,
    admin_open: bool,
    next_id: u8,
    pending_request_id: Option<u8>,
    retries_remaining: u32,
    deadline: Option<Instant>,
    max_configure: u32,
    restart_timer: Duration,
    terminate_timeout: Duration,
}

impl<N: Negotiator> Automaton<N> {
    pub fn new(negotiator: N, max_configure: u32, restart_timer: Duration, terminate_timeout: Duration) -> Self {
        Self {
            negotiator,
            state: SubState::Closed,
            admin_open: false,
            next_id: 0,
            pending_request_id: None,
            retries_remaining: 0,
            deadline: None,
            max_configure,
            restart_timer,
            terminate_timeout,
        }
    }

    pub fn state(&self) -> SubState {
        self.state
    }

    pub fn is_opened(&self) -> bool {
        self.state == SubState::Opened
    }

    fn alloc_id(&mut self) -> u8 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Exponential backoff starting at `base`: attempt 0 waits `base`,
    /// attempt 1 waits `2*base`, and so on, capped at `MAX_BACKOFF_SHIFT`
    /// doublings.
    fn backoff(base: Duration, attempt: u32) -> Duration {
        base * (1u32 << attempt.min(MAX_BACKOFF_SHIFT))
    }

    fn send_configure_request(&mut self, now: Instant) -> AOutput {
        let id = self.alloc_id();
        self.pending_request_id = Some(id);
        let options = self.negotiator.build_request();
        let pkt = ControlPacket { code: Code::ConfigureRequest, identifier: id, data: crate::control::encode_options(&options) };
        let attempt = self.max_configure.saturating_sub(self.retries_remaining);
        self.deadline = Some(now + Self::backoff(self.restart_timer, attempt));
        AOutput::Send(self.negotiator.protocol(), pkt.encode())
    }

    fn send_terminate_request(&mut self, now: Instant) -> AOutput {
        let id = self.alloc_id();
        let pkt = ControlPacket { code: Code::TerminateRequest, identifier: id, data: Vec::new() };
        let attempt = TERMINATE_RETRIES.saturating_sub(self.retries_remaining);
        self.deadline = Some(now + Self::backoff(self.terminate_timeout, attempt));
        AOutput::Send(self.negotiator.protocol(), pkt.encode())
    }

    fn transition_down(&mut self) -> Vec<AOutput> {
        let was_opened = self.state == SubState::Opened;
        self.negotiator.on_closed();
        self.state = if self.admin_open { SubState::Starting } else { SubState::Closed };
        self.deadline = None;
        if was_opened {
            vec![AOutput::Closed]
        } else {
            Vec::new()
        }
    }

    pub fn step(&mut self, event: AEvent, now: Instant) -> Vec<AOutput> {
        use SubState::*;
        match event {
            AEvent::Open => {
                self.admin_open = true;
                if self.state == Closed {
                    self.state = Starting;
                }
                Vec::new()
            }
            AEvent::Close => {
                self.admin_open = false;
                match self.state {
                    Closed | Starting => {
                        self.state = Closed;
                        Vec::new()
                    }
                    _ => {
                        let was_opened = self.state == Opened;
                        self.state = Terminating;
                        self.retries_remaining = TERMINATE_RETRIES;
                        let out = self.send_terminate_request(now);
                        if was_opened {
                            self.negotiator.on_closed();
                            vec![AOutput::Closed, out]
                        } else {
                            vec![out]
                        }
                    }
                }
            }
            AEvent::Up => {
                if self.state == Starting {
                    self.retries_remaining = self.max_configure;
                    self.state = ReqSent;
                    vec![self.send_configure_request(now)]
                } else {
                    Vec::new()
                }
            }
            AEvent::Down => self.transition_down(),
            AEvent::RecvConfigureRequest { identifier, options } => self.handle_rcr(identifier, &options, now),
            AEvent::RecvConfigureAck { identifier, options } => self.handle_rca(identifier, &options, now),
            AEvent::RecvConfigureNak { identifier, options } => self.handle_rcn(identifier, &options, now, false),
            AEvent::RecvConfigureReject { identifier, options } => self.handle_rcn(identifier, &options, now, true),
            AEvent::RecvTerminateRequest => {
                let id_ack = ControlPacket { code: Code::TerminateAck, identifier: 0, data: Vec::new() };
                let ack_out = AOutput::Send(self.negotiator.protocol(), id_ack.encode());
                match self.state {
                    Terminating => vec![ack_out],
                    Closed | Starting => vec![ack_out],
                    _ => {
                        let mut out = self.transition_down();
                        out.push(ack_out);
                        out
                    }
                }
            }
            AEvent::RecvTerminateAck => {
                if self.state == Terminating {
                    self.state = if self.admin_open { Starting } else { Closed };
                    self.deadline = None;
                    vec![AOutput::Closed]
                } else {
                    Vec::new()
                }
            }
            AEvent::Tick(now) => self.handle_tick(now),
        }
    }

    fn handle_rcr(&mut self, identifier: u8, options: &[(u8, Vec<u8>)], now: Instant) -> Vec<AOutput> {
        let (reply, reply_options) = self.negotiator.review_request(options);
        let code = match reply {
            ReplyCode::Ack => Code::ConfigureAck,
            ReplyCode::Nak => Code::ConfigureNak,
            ReplyCode::Reject => Code::ConfigureReject,
        };
        let pkt = ControlPacket { code, identifier, data: crate::control::encode_options(&reply_options) };
        let send = AOutput::Send(self.negotiator.protocol(), pkt.encode());

        use SubState::*;
        match (self.state, reply) {
            (ReqSent, ReplyCode::Ack) => {
                self.state = AckSent;
                vec![send]
            }
            (ReqSent, _) => vec![send],
            (AckReceived, ReplyCode::Ack) => {
                self.state = Opened;
                self.deadline = None;
                self.negotiator.on_opened();
                vec![send, AOutput::Opened]
            }
            (AckReceived, _) => vec![send],
            (AckSent, ReplyCode::Ack) => vec![send],
            (AckSent, _) => {
                self.state = ReqSent;
                let req = self.send_configure_request(now);
                vec![send, req]
            }
            (Opened, ReplyCode::Ack) => vec![send],
            (Opened, _) => {
                self.negotiator.on_closed();
                self.state = ReqSent;
                self.retries_remaining = self.max_configure;
                let req = self.send_configure_request(now);
                vec![AOutput::Closed, send, req]
            }
            _ => vec![send],
        }
    }

    fn handle_rca(&mut self, identifier: u8, options: &[(u8, Vec<u8>)], _now: Instant) -> Vec<AOutput> {
        if self.pending_request_id != Some(identifier) {
            return Vec::new();
        }
        if !self.negotiator.on_ack(options) {
            return Vec::new();
        }
        use SubState::*;
        match self.state {
            ReqSent => {
                self.state = AckReceived;
                self.deadline = None;
                Vec::new()
            }
            AckSent => {
                self.state = Opened;
                self.deadline = None;
                self.negotiator.on_opened();
                vec![AOutput::Opened]
            }
            _ => Vec::new(),
        }
    }

    fn handle_rcn(&mut self, identifier: u8, options: &[(u8, Vec<u8>)], now: Instant, rejected: bool) -> Vec<AOutput> {
        if self.pending_request_id != Some(identifier) {
            return Vec::new();
        }
        if rejected {
            self.negotiator.on_reject(options);
        } else {
            self.negotiator.on_nak(options);
        }
        use SubState::*;
        match self.state {
            ReqSent | AckSent => {
                self.state = ReqSent;
                vec![self.send_configure_request(now)]
            }
            AckReceived => {
                self.state = ReqSent;
                vec![self.send_configure_request(now)]
            }
            _ => Vec::new(),
        }
    }

    fn handle_tick(&mut self, now: Instant) -> Vec<AOutput> {
        let Some(deadline) = self.deadline else { return Vec::new() };
        if now < deadline {
            return Vec::new();
        }
        use SubState::*;
        match self.state {
            ReqSent | AckReceived | AckSent => {
                if self.retries_remaining == 0 {
                    self.negotiator.on_closed();
                    self.state = Closed;
                    self.admin_open = false;
                    self.deadline = None;
                    vec![AOutput::TimedOut]
                } else {
                    self.retries_remaining -= 1;
                    vec![self.send_configure_request(now)]
                }
            }
            Terminating => {
                if self.retries_remaining == 0 {
                    self.state = Closed;
                    self.admin_open = false;
                    self.deadline = None;
                    vec![AOutput::Closed]
                } else {
                    self.retries_remaining -= 1;
                    vec![self.send_terminate_request(now)]
                }
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcp::LcpNegotiator;
    use std::time::Duration;

    fn new_lcp() -> Automaton<LcpNegotiator> {
        Automaton::new(LcpNegotiator::new(1500), 10, Duration::from_secs(3), Duration::from_secs(2))
    }

    #[test]
    fn converges_to_opened_against_conformant_peer() {
        let now = Instant::now();
        let mut a = new_lcp();
        let mut b = new_lcp();
        a.step(AEvent::Open, now);
        b.step(AEvent::Open, now);
        let outs_a = a.step(AEvent::Up, now);
        let outs_b = b.step(AEvent::Up, now);

        let mut pending_a = extract_send(&outs_a);
        let mut pending_b = extract_send(&outs_b);

        for _ in 0..5 {
            if a.is_opened() && b.is_opened() {
                break;
            }
            let mut next_a = Vec::new();
            let mut next_b = Vec::new();
            for (_, bytes) in pending_b.drain(..) {
                next_a.extend(deliver(&mut a, &bytes, now));
            }
            for (_, bytes) in pending_a.drain(..) {
                next_b.extend(deliver(&mut b, &bytes, now));
            }
            pending_a = next_a;
            pending_b = next_b;
        }

        assert!(a.is_opened(), "a did not reach Opened");
        assert!(b.is_opened(), "b did not reach Opened");
    }

    #[test]
    fn times_out_against_silent_peer() {
        let mut now = Instant::now();
        let mut a = new_lcp();
        a.step(AEvent::Open, now);
        a.step(AEvent::Up, now);

        // Each step is longer than the largest possible backed-off deadline
        // (restart_timer * 2^MAX_BACKOFF_SHIFT = 3s * 32 = 96s), so every
        // tick is guaranteed to land past whatever the current deadline is.
        let mut timed_out = false;
        for _ in 0..15 {
            now += Duration::from_secs(100);
            let outs = a.step(AEvent::Tick(now), now);
            if outs.contains(&AOutput::TimedOut) {
                timed_out = true;
                break;
            }
        }
        assert!(timed_out);
        assert_eq!(a.state(), SubState::Closed);
    }

    #[test]
    fn configure_retransmission_backs_off_exponentially() {
        let now = Instant::now();
        let mut a = new_lcp(); // restart_timer = 3s
        a.step(AEvent::Open, now);
        let outs = a.step(AEvent::Up, now);
        assert!(matches!(outs.as_slice(), [AOutput::Send(_, _)]));

        // First retransmit deadline is the bare restart timer (3s): nothing
        // yet at +2s, but due by +3s.
        let t_early = now + Duration::from_secs(2);
        assert!(a.step(AEvent::Tick(t_early), t_early).is_empty());
        let t1 = now + Duration::from_secs(3);
        let outs1 = a.step(AEvent::Tick(t1), t1);
        assert!(matches!(outs1.as_slice(), [AOutput::Send(_, _)]));

        // Second retransmit backs off to 2x (6s): not yet at +5s from t1,
        // but due by +6s.
        let t1_early = t1 + Duration::from_secs(5);
        assert!(a.step(AEvent::Tick(t1_early), t1_early).is_empty());
        let t2 = t1 + Duration::from_secs(6);
        let outs2 = a.step(AEvent::Tick(t2), t2);
        assert!(matches!(outs2.as_slice(), [AOutput::Send(_, _)]));
    }

    fn extract_send(outs: &[AOutput]) -> Vec<(u16, Vec<u8>)> {
        outs.iter()
            .filter_map(|o| if let AOutput::Send(p, b) = o { Some((*p, b.clone())) } else { None })
            .collect()
    }

    fn deliver(a: &mut Automaton<LcpNegotiator>, bytes: &[u8], now: Instant) -> Vec<(u16, Vec<u8>)> {
        let pkt = ControlPacket::decode(bytes).unwrap();
        let options = crate::control::parse_options(&pkt.data);
        let event = match pkt.code {
            Code::ConfigureRequest => AEvent::RecvConfigureRequest { identifier: pkt.identifier, options },
            Code::ConfigureAck => AEvent::RecvConfigureAck { identifier: pkt.identifier, options },
            Code::ConfigureNak => AEvent::RecvConfigureNak { identifier: pkt.identifier, options },
            Code::ConfigureReject => AEvent::RecvConfigureReject { identifier: pkt.identifier, options },
            Code::TerminateRequest => AEvent::RecvTerminateRequest,
            Code::TerminateAck => AEvent::RecvTerminateAck,
            _ => return Vec::new(),
        };
        extract_send(&a.step(event, now))
    }
}
