pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const DEFAULT_DIFFICULTY: usize = 2;
pub const DEFAULT_STORAGE_FILE: &str = "blockchain.json";
/// Nonces handed to rayon per parallel search round.
pub const NONCE_BATCH: u64 = 1 << 16;
/// Sequential search polls the cancel flag every this many nonces.
pub const CANCEL_POLL_INTERVAL: u64 = 4096;
