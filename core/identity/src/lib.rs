//! Identity resolution for Letterbox.
//!
//! Maps an identity-provider subject id to exactly one local user, keeps that
//! user's credential current on every login, and binds browser sessions to
//! user ids.

pub mod resolver;

pub use resolver::{IdentityResolver, SESSION_TTL_HOURS};
