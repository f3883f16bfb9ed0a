/// Root namespaces seeded by the relay and subscribed to by clients
pub const NS_MESSAGES: &str = "messages";
pub const NS_USERS: &str = "users";
pub const NS_CHANNELS: &str = "channels";
pub const NS_PRESENCE: &str = "presence";

pub const ROOT_NAMESPACES: [&str; 4] = [NS_MESSAGES, NS_USERS, NS_CHANNELS, NS_PRESENCE];

/// Field written into a namespace root so the node exists before real data does
pub const SENTINEL_FIELD: &str = "initialized";

/// Channel every client knows about from the start
pub const DEFAULT_CHANNEL: &str = "general";

/// Creator recorded on channels seeded by the relay
pub const SYSTEM_CREATOR: &str = "system";

/// Presence heartbeat period in seconds
pub const HEARTBEAT_SECS: u64 = 15;

/// Age after which a client treats a presence record as offline (seconds)
pub const STALENESS_WINDOW_SECS: u64 = 30;

/// Relay sweep period in seconds
pub const SWEEP_INTERVAL_SECS: u64 = 30;

/// Age after which the relay force-marks a presence record offline (seconds)
pub const SWEEP_THRESHOLD_SECS: u64 = 60;

/// Default relay HTTP/WebSocket port
pub const DEFAULT_RELAY_PORT: u16 = 8765;

/// Path of the graph WebSocket endpoint on the relay
pub const GRAPH_ENDPOINT_PATH: &str = "/gun";

/// Longest edge of an uploaded image after downscaling, in pixels
pub const MAX_IMAGE_DIMENSION: u32 = 1024;

/// JPEG quality used when recompressing uploads (0-100)
pub const JPEG_QUALITY: u8 = 70;

/// Maximum accepted size of a raw media file before processing (5 MiB)
pub const MAX_MEDIA_SIZE: usize = 5 * 1024 * 1024;

/// Seeded avatar service used when a user has no profile picture
pub const DEFAULT_AVATAR_BASE: &str = "https://api.dicebear.com/9.x/thumbs/svg?seed=";

/// Pinning service endpoints
pub const PINATA_PIN_FILE_URL: &str = "https://api.pinata.cloud/pinning/pinFileToIPFS";
pub const PINATA_GATEWAY_BASE: &str = "https://gateway.pinata.cloud/ipfs/";

/// BLAKE3 context binding the stretched password to the account seal
pub const KDF_CONTEXT_ACCOUNT_KEY: &str = "anontalk-account-seal-v1";

/// Argon2id cost for stretching account passwords (19 MiB, 2 passes, 1 lane)
pub const ARGON2_MEMORY_KIB: u32 = 19 * 1024;
pub const ARGON2_ITERATIONS: u32 = 2;
pub const ARGON2_PARALLELISM: u32 = 1;

/// Salt size for the password-derived account key
pub const SALT_SIZE: usize = 16;

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;
