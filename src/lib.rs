//! Client library for the church membership backend.
//!
//! Wraps the REST API behind [`client::Gateway`] and layers the dashboard
//! workflows on top of it: loading the roster and ministry catalog, the
//! role-gated member edit session, member creation, and account settings.

pub mod account;
pub mod client;
pub mod config;
pub mod create;
pub mod edit;
pub mod member;
pub mod roster;
pub mod search;
pub mod session;
pub mod storage;
pub mod theme;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ChurchClient, Gateway, GatewayError};
pub use config::ClientConfig;
pub use member::{
    Member, MemberField, MemberId, MemberStatus, Ministry, MinistryId, Sex, VisionStatus,
};
pub use roster::Roster;
pub use session::{Capabilities, Capability, Role, Session, SessionContext};
