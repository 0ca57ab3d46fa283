//! Checkpoint id generation.

use rand::RngCore;

/// Length of a checkpoint id in hex characters.
pub const CHECKPOINT_ID_LEN: usize = 16;

/// Allocate a fresh checkpoint id: uniformly random hex, long enough to
/// shard well under the two-character tree prefix.
pub fn new_checkpoint_id() -> String {
    let mut bytes = [0u8; CHECKPOINT_ID_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Whether a string is a plausible checkpoint id (12+ hex chars).
pub fn is_checkpoint_id(s: &str) -> bool {
    s.len() >= 12 && s.chars().all(|c| c.is_ascii_hexdigit())
}
