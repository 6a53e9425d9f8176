//! Infrastructure layer: storage backends and external service adapters.
//!
//! - [`memory`]: in-process tables with journaled units of work (dev, tests).
//! - [`postgres`]: sqlx-backed stores and transactions.
//! - [`otp`]: development OTP sender.

pub mod memory;
pub mod otp;
pub mod postgres;


pub use memory::{MemoryDb, MemoryStore, RowCounts};
pub use otp::DevOtpSender;
pub use postgres::{PgDb, PgStore};
