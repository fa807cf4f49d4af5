//! Bearer token authentication, log-in, registration and access control.

mod access;
mod log_in;
mod register;
mod token;

pub use access::{current_user, ensure_admin, ensure_can_access};
pub use log_in::{AuthResponse, post_log_in};
pub use register::register_user;
pub use token::{Claims, encode_jwt};
