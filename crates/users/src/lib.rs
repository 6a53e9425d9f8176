//! `propdesk-users`: user accounts with their model, persistence port, business core,
//! caching decorator, and the password/OTP ports it depends on.

pub mod cache;
pub mod user_core;
pub mod model;
pub mod otp;
pub mod password;
pub mod store;

pub use cache::UserCache;
pub use user_core::UserCore;
pub use model::{MIN_PASSWORD_LEN, NewUser, UpdateUser, User, is_valid_phone};
pub use otp::{OtpError, OtpSender};
pub use password::{
    BcryptHasher, DEFAULT_PASSWORD_COST, MAX_PASSWORD_BYTES, MAX_PASSWORD_COST, MIN_PASSWORD_COST, PasswordError,
    PasswordHasher,
};
pub use store::UserStore;
