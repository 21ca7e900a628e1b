pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
/// Peer chains accepted in one `/resolve` call.
pub const MAX_CANDIDATES_PER_REQUEST: usize = 32;
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
