//! `propdesk-core`: domain foundation shared by every entity crate.
//!
//! This crate contains identifiers, the lifecycle status, the domain error
//! model and the persistence primitives (unit of work, rebinding) that the
//! entity stores build on. It performs no IO itself.

pub mod entity;
pub mod error;
pub mod id;
pub mod status;
pub mod store;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, FieldError, FieldErrors};
pub use id::{BlockId, FloorId, PropertyId, UnitId, UserId};
pub use status::Status;
pub use store::{Beginner, Rebind, Repository, StoreError, TxHandle, UnitOfWork};
