//! SRV record ordering, shared by every resolver backend capable of SRV lookups.
//!
//! Generalizes the teacher's `SrvRecord` trait: instead of parsing each record into a
//! candidate request URI (`http::Uri`), only the pieces a domain worker needs — target
//! host, port, priority, weight — survive, since this crate hands resolved targets to
//! the backend registry rather than to an HTTP client.

use std::cmp::Reverse;
use std::fmt::Display;

use rand::Rng;

/// Representation of types that contain the fields of a SRV record.
pub trait SrvRecord {
    /// Type representing the SRV record's target.
    type Target: Display + ?Sized;

    /// The record's target hostname.
    fn target(&self) -> &Self::Target;
    /// The target's port.
    fn port(&self) -> u16;
    /// The record's priority; lower values are preferred.
    fn priority(&self) -> u16;
    /// The record's weight, used to distribute load within a priority tier.
    fn weight(&self) -> u16;

    /// Generates a key to sort a SRV record by priority and weight per RFC 2782.
    fn sort_key(&self, rng: impl Rng) -> (u16, Reverse<u32>) {
        sort_key(self.priority(), self.weight(), rng)
    }
}

/// Generates a key to sort a SRV record by priority and weight per RFC 2782.
///
/// Sorts ascending by priority, then descending (hence `Reverse`) by a weight
/// multiplied by a random draw, so that over many draws selection frequency within a
/// priority tier is proportional to weight. A weight of 0 always produces a draw of 0,
/// so it sorts last among positive-weight peers at the same priority and is chosen only
/// once they're exhausted.
pub(crate) fn sort_key(priority: u16, weight: u16, mut rng: impl Rng) -> (u16, Reverse<u32>) {
    let rand = rng.gen::<u16>() as u32;
    (priority, Reverse(weight as u32 * rand))
}
