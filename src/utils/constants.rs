//! Shared constants and invariants

// Durable store keys
pub const ACCESS_KEY: &str = "accessToken";
pub const REFRESH_KEY: &str = "refreshToken";

pub const DEFAULT_REFRESH_PATH: &str = "/auth/reissue";
pub const DEFAULT_LOGOUT_PATH: &str = "/auth/logout";

pub const BEARER_PREFIX: &str = "Bearer ";

/// Endpoints callable without a credential: issuance, availability checks, refresh itself.
/// Matched as substrings of the request target.
pub const DEFAULT_ALLOWLIST: [&str; 8] = [
    "/auth/check-email",
    "/auth/check-nickname",
    "/auth/send-email",
    "/auth/check-email-verified",
    "/auth/validate-password",
    "/auth/userSignup",
    "/auth/login",
    "/auth/reissue",
];

