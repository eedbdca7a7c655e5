//! Typed records for the ≈25 entity kinds the store holds (C2), plus the
//! universal `Entity`/`SemanticEq` predicates every kind implements.

pub mod common;
pub mod config_eq;
pub mod consumers;
pub mod creds;
pub mod custom;
pub mod proxy;
pub mod rbac;

pub use common::{Entity, EqualOpts, ForeignRef, SemanticEq};
pub use config_eq::config_equal;
