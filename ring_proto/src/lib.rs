pub mod ring {
    tonic::include_proto!("ring");
}

/// Fixed liveness token returned by the Heart RPC. A peer is considered alive
/// only when it answers with exactly this value.
pub const HEART_RESPONSE: &str = "beat";

/// Maps a key (a node's `ip:port` or a user nickname) to a point in the ring's
/// ID space `[0, 2^capacity)`.
pub fn ring_id(key: &str, capacity: u32) -> u64 {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    let value = u64::from_be_bytes(bytes);
    if capacity >= 64 {
        value
    } else {
        value % (1u64 << capacity)
    }
}
