//! Offer/answer role selection

use crate::signaling::protocol::AcceptMessage;

/// Which side creates the offer, decided once from `accept`
///
/// The server flags whether someone is already in the room. Whoever finds
/// the room occupied offers; the first arrival waits for that offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// The room was occupied: create the offer
    Initiator,
    /// The room was empty: wait for the remote offer
    Responder,
    /// Both occupancy flags were set; treated as [`Polarity::Initiator`]
    Ambiguous,
}

impl Polarity {
    /// Missing flags count as `false`
    pub fn from_accept(accept: &AcceptMessage) -> Self {
        let exist_client = accept.is_exist_client.unwrap_or(false);
        let exist_user = accept.is_exist_user.unwrap_or(false);

        match (exist_client, exist_user) {
            (true, true) => Polarity::Ambiguous,
            (true, false) | (false, true) => Polarity::Initiator,
            (false, false) => Polarity::Responder,
        }
    }

    pub fn is_initiator(&self) -> bool {
        !matches!(self, Polarity::Responder)
    }
}
