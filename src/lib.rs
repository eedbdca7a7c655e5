//! An in-memory relational snapshot and reconciliation engine for an API
//! gateway's admin API.
//!
//! Four stages compose the pipeline: the [`dump`] module concurrently lists
//! every entity kind from the remote, the [`build`] module resolves those
//! raw rows into the typed, cross-referenced [`store`], the [`schema`] and
//! [`strip`] modules normalize each schema-backed entity's config down to
//! its non-default fields, and [`snapshot::snapshot`] drives all three in
//! sequence. [`entity`] holds the typed records and the structural-equality
//! predicates a diff engine built on top of this crate would use.

pub mod build;
pub mod dump;
pub mod entity;
pub mod error;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod strip;
pub mod tags;
pub mod transport;

pub use build::Builder;
pub use dump::{DumperConfig, Dumper, RawState};
pub use entity::{Entity, EqualOpts, ForeignRef, SemanticEq};
pub use error::{Error, Result};
pub use schema::SchemaRegistry;
pub use snapshot::snapshot;
pub use store::Store;
pub use strip::DefaultStripper;
pub use transport::{AdminApiClient, HttpAdminApiClient};
