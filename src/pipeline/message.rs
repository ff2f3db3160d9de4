//! Notifications carried downstream when a node's state invalidates history.

use crate::pipeline::id::NodeId;
use serde::Serialize;

/// Immutable downstream notification.
///
/// Produced once per triggering event at the node where it originated and
/// delivered hop by hop to every reachable descendant, output branches
/// included. Messages are never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Something upstream changed; receivers re-check their observed attributes.
    pub there_has_been_a_change: bool,
    /// Buffered history spanning this point must be discarded.
    pub output_history_is_no_longer_valid: bool,
    /// Node where the event originated.
    pub origin: NodeId,
    /// Hops travelled so far; 1 for the origin's direct receivers.
    pub hops: u32,
}

impl Message {
    /// Message emitted after a node reinitializes.
    pub fn reinitialized(origin: NodeId) -> Self {
        Self {
            there_has_been_a_change: true,
            output_history_is_no_longer_valid: true,
            origin,
            hops: 0,
        }
    }

    /// Host-reported discontinuity in `origin`'s output.
    pub fn discontinuity(origin: NodeId) -> Self {
        Self::reinitialized(origin)
    }

    /// Same facets and origin, one hop further.
    pub fn forwarded(&self) -> Self {
        Self {
            hops: self.hops + 1,
            ..*self
        }
    }

    #[inline]
    pub fn history_invalid(&self) -> bool {
        self.output_history_is_no_longer_valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarding_keeps_facets() {
        let msg = Message::reinitialized(NodeId(2));
        let hop = msg.forwarded().forwarded();
        assert_eq!(hop.origin, NodeId(2));
        assert_eq!(hop.hops, 2);
        assert!(hop.there_has_been_a_change);
        assert!(hop.history_invalid());
    }
}
