/// Address the gateway service listens on.
pub const GATEWAY_ADDR: &str = "127.0.0.1:8080";

/// Address the secret store service listens on.
pub const STORE_ADDR: &str = "127.0.0.1:8081";

/// Address of the external credential verifier.
pub const VERIFIER_ADDR: &str = "127.0.0.1:8082";

/// Issuer claim stamped into and required on every token.
pub const ISSUER: &str = "tokenauth";

/// Default signing algorithm.
pub const ALGORITHM: &str = "HS256";

/// Lifetime of an issued token.
pub const TOKEN_LIFETIME_SECS: u64 = 15 * 60;

/// Rotation TTL of a subject's signing secret, counted from its most
/// recent issuance. Never shorter than a token's lifetime plus leeway.
pub const SECRET_TTL_SECS: u64 = 20 * 60;

/// Longest TTL the Authority or the store service accepts.
pub const MAX_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Length in bytes of a freshly generated secret. Never less than
/// `MIN_SECRET_LEN`.
pub const SECRET_LEN: usize = 32;

/// Smallest secret the Authority will sign with.
pub const MIN_SECRET_LEN: usize = 32;

/// Clock skew tolerated on `nbf` and `exp`.
pub const LEEWAY_SECS: u64 = 5;

/// How long after issuance a signature mismatch is treated as a possible
/// lost secret creation race and retried once.
pub const MISMATCH_RETRY_SECS: u64 = 10;

/// Bound on a single round trip to the secret store.
pub const STORE_TIMEOUT_MILLIS: u64 = 2000;

/// Interval at which the store service reclaims expired secrets.
pub const PURGE_INTERVAL_MILLIS: u64 = 30_000;

/// Prefix of the store key holding a subject's secret.
pub const SECRET_KEY_PREFIX: &str = "secret:";

/// Name of the cookie that may carry the bearer token.
pub const COOKIE_NAME: &str = "token";

/// Number of low bits reserved below the first elementary permission.
pub const PERMISSION_NEEDLE: u32 = 4;

/// Permission bits must fit in 53 bits so that JSON consumers using
/// doubles never lose precision.
pub const PERMISSION_MASK: u64 = 0x1f_ffff_ffff_ffff;
