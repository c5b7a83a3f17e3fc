//! Process-wide id allocators for not-yet-committed objects

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

static ENTITY_SEQUENCER: AtomicI64 = AtomicI64::new(0);
static DESCRIPTOR_SEQUENCER: AtomicI32 = AtomicI32::new(0);
static REQUEST_SEQUENCER: AtomicI64 = AtomicI64::new(0);
static MESSAGE_SEQUENCER: AtomicI64 = AtomicI64::new(0);

/// Allocate a virtual id for a new entity. Virtual ids are negative and
/// monotonically decreasing; the server replaces them with real ids at
/// commit.
///
/// # Examples
/// ```
/// use graphlink::model::id_gen::next_virtual_id;
///
/// let a = next_virtual_id();
/// let b = next_virtual_id();
/// assert!(a < 0);
/// assert!(b < a);
/// ```
pub fn next_virtual_id() -> i64 {
    ENTITY_SEQUENCER.fetch_sub(1, Ordering::SeqCst) - 1
}

/// Allocate a temporary id for a locally created attribute descriptor.
/// Negative until the commit response assigns the real id.
pub fn next_descriptor_id() -> i64 {
    (DESCRIPTOR_SEQUENCER.fetch_sub(1, Ordering::SeqCst) - 1) as i64
}

/// Allocate a correlation id for an outbound request.
pub fn next_request_id() -> i64 {
    REQUEST_SEQUENCER.fetch_add(1, Ordering::SeqCst)
}

/// Allocate a message sequence number for the envelope header.
pub fn next_sequence_no() -> i64 {
    MESSAGE_SEQUENCER.fetch_add(1, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_ids_are_negative_and_unique() {
        let a = next_virtual_id();
        let b = next_virtual_id();
        let c = next_virtual_id();
        assert!(a < 0 && b < a && c < b);
    }

    #[test]
    fn descriptor_ids_never_collide_with_each_other() {
        let a = next_descriptor_id();
        let b = next_descriptor_id();
        assert!(a < 0);
        assert_ne!(a, b);
    }

    #[test]
    fn request_ids_count_up() {
        let a = next_request_id();
        let b = next_request_id();
        assert!(b > a);
    }
}
