//! Route paths, relative to `API_PREFIX`.

pub const API_PREFIX: &str = "/api/v1";

pub const HEALTH: &str = "/health";

pub const AUTH_REGISTER: &str = "/auth/register";
pub const AUTH_LOGIN: &str = "/auth/login";
pub const AUTH_REFRESH: &str = "/auth/refresh";
pub const AUTH_LOGOUT: &str = "/auth/logout";
pub const AUTH_VERIFY_EMAIL: &str = "/auth/verify-email";
pub const AUTH_RESEND_VERIFICATION: &str = "/auth/resend-verification";
pub const AUTH_FORGOT_PASSWORD: &str = "/auth/forgot-password";
pub const AUTH_RESET_PASSWORD: &str = "/auth/reset-password";
pub const AUTH_ME: &str = "/auth/me";
pub const AUTH_CHANGE_PASSWORD: &str = "/auth/change-password";

pub const USER: &str = "/users/{id}";
pub const USER_BAN: &str = "/users/{id}/ban";
pub const USER_UNBAN: &str = "/users/{id}/unban";
pub const USER_VERIFY: &str = "/users/{id}/verify";
