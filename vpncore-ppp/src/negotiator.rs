/// What to send back in response to a peer's Configure-Request, per
/// RFC 1661 §4.3: reject wins over nak wins over ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Ack,
    Nak,
    Reject,
}

/// Per-sub-protocol option negotiation logic. The generic `Automaton`
/// drives the common restart-timer/state-transition machinery; each of
/// LCP/IPCP/IPV6CP plugs in its own option set and acceptance rules here.
pub trait Negotiator: Send {
    fn protocol(&self) -> u16;
    fn name(&self) -> &'static str;

    /// Options we currently want to propose, reflecting any adjustments
    /// made by a prior `on_nak`/`on_reject`.
    fn build_request(&mut self) -> Vec<(u8, Vec<u8>)>;

    /// Review the peer's Configure-Request. Returns the reply code and the
    /// option list to carry in that reply (all options, echoed, for Ack;
    /// only the counter-proposed options for Nak; only the unacceptable
    /// ones for Reject).
    fn review_request(&mut self, peer_options: &[(u8, Vec<u8>)]) -> (ReplyCode, Vec<(u8, Vec<u8>)>);

    /// Our Configure-Request was acked. Returns `false` if the echoed
    /// options don't match what we last sent (malformed peer behavior).
    fn on_ack(&mut self, acked_options: &[(u8, Vec<u8>)]) -> bool;

    /// Our Configure-Request was nak'd; adjust our desired options for the
    /// next request.
    fn on_nak(&mut self, counter_options: &[(u8, Vec<u8>)]);

    /// Our Configure-Request was rejected; drop those options entirely.
    fn on_reject(&mut self, rejected_options: &[(u8, Vec<u8>)]);

    /// This protocol has reached `Opened`.
    fn on_opened(&mut self) {}

    /// This protocol has left `Opened` (or negotiation was abandoned).
    fn on_closed(&mut self) {}
}
