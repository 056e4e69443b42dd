//! Simultaneous-dial tie break.
//!
//! When both nodes dial each other at once, each ends up with an inbound and an outbound
//! connection for the same peer. Both sides evaluate [`surviving_direction`] over the same
//! pair of ids and keep the same physical connection: the one dialled by the node with the
//! larger id.

use aster_net_primitives::{Direction, PeerId};

/// Direction of the connection that survives a collision, seen from `local`.
pub fn surviving_direction(local: &PeerId, remote: &PeerId) -> Direction {
    if local <= remote {
        Direction::Inbound
    } else {
        Direction::Outbound
    }
}

/// Whether a new connection in `new_direction` replaces an already registered one.
pub fn new_connection_wins(local: &PeerId, remote: &PeerId, new_direction: Direction) -> bool {
    surviving_direction(local, remote) == new_direction
}
