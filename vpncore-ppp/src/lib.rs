//! The PPP link: LCP/IPCP/IPV6CP negotiation, authentication-phase bypass,
//! keepalive/DPD, and termination (RFC 1661/1332/5072), reduced to exactly
//! the states and transitions a pre-authenticated tunnel client needs.

pub mod automaton;
pub mod control;
pub mod error;
pub mod ipcp;
pub mod ipv6cp;
pub mod lcp;
pub mod negotiator;

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use vpncore_framing::{PROTO_IP, PROTO_IPCP, PROTO_IPV6, PROTO_IPV6CP, PROTO_LCP};

pub use automaton::{AEvent, AOutput, Automaton, SubState};
pub use control::{Code, ControlPacket};
pub use error::PppError;
pub use ipcp::IpcpNegotiator;
pub use ipv6cp::Ipv6cpNegotiator;
pub use lcp::LcpNegotiator;
pub use negotiator::{Negotiator, ReplyCode};

/// The link's overall phase, spanning all three sub-protocols (spec data
/// model). `AuthBypass` is entered and left within the same `step()` call:
/// we never actually wait in it, since we refuse auth outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Dead,
    Establish,
    AuthBypass,
    Network,
    Open,
    Terminate,
}

/// Inbound events the engine accepts from the transport and the clock.
pub enum PppEvent {
    Up,
    Down,
    Frame { protocol: u16, payload: Vec<u8> },
    Tick(Instant),
}

/// Outbound effects the engine produces for its driver to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PppOutput {
    /// A framed PPP packet ready for the link layer, protocol number first.
    Send(u16, Vec<u8>),
    /// A decoded network-layer payload to deliver to the local interface.
    Deliver(u16, Vec<u8>),
    PhaseChanged(Phase),
    /// LCP (and therefore the whole link) gave up after `dpd_fail_count`
    /// missed echoes or `max_configure` failed negotiation attempts.
    Failed(PppError),
}

const ECHO_MAGIC_PLACEHOLDER: u32 = 0;

/// Ties the three per-protocol automatons together into the link-wide
/// state machine, and layers keepalive/DPD and authentication-phase bypass
/// on top.
pub struct PppEngine {
    lcp: Automaton<LcpNegotiator>,
    ipcp: Automaton<IpcpNegotiator>,
    ipv6cp: Automaton<Ipv6cpNegotiator>,
    phase: Phase,
    dpd_interval: Duration,
    dpd_fail_count: u32,
    last_echo_sent: Option<Instant>,
    missed_echoes: u32,
    pending_echo_id: Option<u8>,
    next_echo_id: u8,
    use_ipv6: bool,
}

impl PppEngine {
    pub fn new(
        mru: u16,
        local_v4: Ipv4Addr,
        primary_dns: Option<Ipv4Addr>,
        use_ipv6: bool,
        max_configure: u32,
        restart_timer: Duration,
        terminate_timeout: Duration,
        dpd_interval: Duration,
        dpd_fail_count: u32,
    ) -> Self {
        Self {
            lcp: Automaton::new(LcpNegotiator::new(mru), max_configure, restart_timer, terminate_timeout),
            ipcp: Automaton::new(IpcpNegotiator::new(local_v4, primary_dns), max_configure, restart_timer, terminate_timeout),
            ipv6cp: Automaton::new(Ipv6cpNegotiator::new(local_v4), max_configure, restart_timer, terminate_timeout),
            phase: Phase::Dead,
            dpd_interval,
            dpd_fail_count,
            last_echo_sent: None,
            missed_echoes: 0,
            pending_echo_id: None,
            next_echo_id: 0,
            use_ipv6,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn lcp(&self) -> &Automaton<LcpNegotiator> {
        &self.lcp
    }

    pub fn ipcp(&self) -> &Automaton<IpcpNegotiator> {
        &self.ipcp
    }

    pub fn ipv6cp(&self) -> &Automaton<Ipv6cpNegotiator> {
        &self.ipv6cp
    }

    fn set_phase(&mut self, phase: Phase, out: &mut Vec<PppOutput>) {
        if self.phase != phase {
            self.phase = phase;
            out.push(PppOutput::PhaseChanged(phase));
        }
    }

    fn forward(&mut self, outs: Vec<AOutput>, out: &mut Vec<PppOutput>) {
        for o in outs {
            match o {
                AOutput::Send(proto, bytes) => out.push(PppOutput::Send(proto, bytes)),
                AOutput::Opened | AOutput::Closed | AOutput::TimedOut => {}
            }
        }
    }

    pub fn step(&mut self, event: PppEvent, now: Instant) -> Vec<PppOutput> {
        let mut out = Vec::new();
        match event {
            PppEvent::Up => {
                self.set_phase(Phase::Establish, &mut out);
                let outs = self.lcp.step(AEvent::Open, now);
                self.forward(outs, &mut out);
                let outs = self.lcp.step(AEvent::Up, now);
                self.forward(outs, &mut out);
            }
            PppEvent::Down => {
                for outs in [self.lcp.step(AEvent::Down, now), self.ipcp.step(AEvent::Down, now), self.ipv6cp.step(AEvent::Down, now)] {
                    self.forward(outs, &mut out);
                }
                self.last_echo_sent = None;
                self.missed_echoes = 0;
                self.pending_echo_id = None;
                self.set_phase(Phase::Dead, &mut out);
            }
            PppEvent::Frame { protocol, payload } => self.handle_frame(protocol, &payload, now, &mut out),
            PppEvent::Tick(now) => self.handle_tick(now, &mut out),
        }
        self.sync_phase(now, &mut out);
        out
    }

    fn handle_frame(&mut self, protocol: u16, payload: &[u8], now: Instant, out: &mut Vec<PppOutput>) {
        match protocol {
            PROTO_LCP => self.dispatch_control(Target::Lcp, payload, now, out),
            PROTO_IPCP => self.dispatch_control(Target::Ipcp, payload, now, out),
            PROTO_IPV6CP if self.use_ipv6 => self.dispatch_control(Target::Ipv6cp, payload, now, out),
            PROTO_IP | PROTO_IPV6 => out.push(PppOutput::Deliver(protocol, payload.to_vec())),
            _ => {}
        }
    }

    fn dispatch_control(&mut self, target: Target, payload: &[u8], now: Instant, out: &mut Vec<PppOutput>) {
        let Some(pkt) = ControlPacket::decode(payload) else { return };
        if target == Target::Lcp {
            match pkt.code {
                Code::EchoRequest => {
                    let reply = ControlPacket { code: Code::EchoReply, identifier: pkt.identifier, data: pkt.data };
                    out.push(PppOutput::Send(PROTO_LCP, reply.encode()));
                    return;
                }
                Code::EchoReply => {
                    if self.pending_echo_id == Some(pkt.identifier) {
                        self.pending_echo_id = None;
                        self.missed_echoes = 0;
                    }
                    return;
                }
                _ => {}
            }
        }
        let options = control::parse_options(&pkt.data);
        let event = match pkt.code {
            Code::ConfigureRequest => AEvent::RecvConfigureRequest { identifier: pkt.identifier, options },
            Code::ConfigureAck => AEvent::RecvConfigureAck { identifier: pkt.identifier, options },
            Code::ConfigureNak => AEvent::RecvConfigureNak { identifier: pkt.identifier, options },
            Code::ConfigureReject => AEvent::RecvConfigureReject { identifier: pkt.identifier, options },
            Code::TerminateRequest => AEvent::RecvTerminateRequest,
            Code::TerminateAck => AEvent::RecvTerminateAck,
            Code::CodeReject | Code::ProtocolReject | Code::DiscardRequest | Code::EchoRequest | Code::EchoReply => return,
        };
        let outs = match target {
            Target::Lcp => self.lcp.step(event, now),
            Target::Ipcp => self.ipcp.step(event, now),
            Target::Ipv6cp => self.ipv6cp.step(event, now),
        };
        self.forward(outs, out);
    }

    /// Promotes the link phase as sub-protocols open, bringing up IPCP (and
    /// IPV6CP, if enabled) the instant LCP reaches `Opened` — skipping any
    /// real wait in `AuthBypass` since we never propose or accept an auth
    /// protocol.
    fn sync_phase(&mut self, now: Instant, out: &mut Vec<PppOutput>) {
        if self.phase == Phase::Establish && self.lcp.is_opened() {
            self.set_phase(Phase::AuthBypass, out);
            self.set_phase(Phase::Network, out);
            let outs = self.ipcp.step(AEvent::Open, now);
            self.forward(outs, out);
            let outs = self.ipcp.step(AEvent::Up, now);
            self.forward(outs, out);
            if self.use_ipv6 {
                let outs = self.ipv6cp.step(AEvent::Open, now);
                self.forward(outs, out);
                let outs = self.ipv6cp.step(AEvent::Up, now);
                self.forward(outs, out);
            }
        }
        if self.phase == Phase::Network {
            let network_ready = self.ipcp.is_opened() && (!self.use_ipv6 || self.ipv6cp.is_opened());
            if network_ready {
                self.set_phase(Phase::Open, out);
            }
        }
        if !self.lcp.is_opened() && matches!(self.phase, Phase::Network | Phase::Open) {
            self.set_phase(Phase::Terminate, out);
        }
    }

    /// Initiates a graceful shutdown: each admin-open sub-protocol sends its
    /// own Terminate-Request. Network-layer protocols close ahead of LCP,
    /// mirroring `sync_phase`'s bring-up order in reverse. Does not wait for
    /// the peer's Terminate-Ack — the driver owns that deadline.
    pub fn close(&mut self, now: Instant) -> Vec<PppOutput> {
        let mut out = Vec::new();
        for outs in [self.ipcp.step(AEvent::Close, now), self.ipv6cp.step(AEvent::Close, now), self.lcp.step(AEvent::Close, now)] {
            self.forward(outs, &mut out);
        }
        self.set_phase(Phase::Terminate, &mut out);
        out
    }

    fn handle_tick(&mut self, now: Instant, out: &mut Vec<PppOutput>) {
        for outs in [self.lcp.step(AEvent::Tick(now), now), self.ipcp.step(AEvent::Tick(now), now), self.ipv6cp.step(AEvent::Tick(now), now)] {
            self.forward(outs, out);
        }
        if !self.lcp.is_opened() {
            self.last_echo_sent = None;
            self.missed_echoes = 0;
            self.pending_echo_id = None;
            return;
        }
        let due = match self.last_echo_sent {
            None => true,
            Some(t) => now.duration_since(t) >= self.dpd_interval,
        };
        if !due {
            return;
        }
        if self.pending_echo_id.is_some() {
            self.missed_echoes += 1;
            if self.missed_echoes >= self.dpd_fail_count {
                let outs = self.lcp.step(AEvent::Down, now);
                self.forward(outs, out);
                out.push(PppOutput::Failed(PppError::Timeout));
                self.last_echo_sent = None;
                self.missed_echoes = 0;
                self.pending_echo_id = None;
                return;
            }
        }
        let id = self.next_echo_id;
        self.next_echo_id = self.next_echo_id.wrapping_add(1);
        self.pending_echo_id = Some(id);
        self.last_echo_sent = Some(now);
        let pkt = ControlPacket { code: Code::EchoRequest, identifier: id, data: ECHO_MAGIC_PLACEHOLDER.to_be_bytes().to_vec() };
        out.push(PppOutput::Send(PROTO_LCP, pkt.encode()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Lcp,
    Ipcp,
    Ipv6cp,
}
