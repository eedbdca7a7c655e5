//! Crate-wide error taxonomy.
//!
//! One variant per category in the error-handling design: store invariants,
//! dumper configuration and transport, schema lookups, and the builder's
//! custom-entity decoding. Transport and serialization errors convert via
//! `#[from]` so `?` composes across the dumper, schema registry, and
//! builder without manual wrapping at every call site.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Mutually exclusive dumper options (e.g. `rbac_resources_only` with
    /// non-empty `selector_tags`).
    #[error("invalid dumper configuration: {0}")]
    ConfigInvalid(String),

    /// `Add`/`Update` with no `id` set.
    #[error("id is required")]
    IdRequired,

    /// `Get`/`Update`/`Delete` found no matching row.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// `Add` collided with an existing unique index entry.
    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: &'static str, key: String },

    /// Filter-chain XOR violation, or any other referential-shape invariant
    /// the store enforces at insert/update time.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Wrapped transport failure, tagged with the entity kind being fetched.
    #[error("transport error while listing {kind}: {source}")]
    Transport {
        kind: String,
        #[source]
        source: reqwest::Error,
    },

    /// A transport call returned a non-2xx status this crate does not
    /// otherwise classify as feature-absence (see `dump::classify`).
    #[error("unexpected status {status} from {path}")]
    UnexpectedStatus { status: u16, path: String },

    /// Schema body failed to parse as JSON, or the registry's fetcher
    /// function itself errored.
    #[error("schema unavailable for {0}")]
    SchemaUnavailable(String),

    /// Builder encountered a custom entity whose payload does not match the
    /// shape its type-dispatched decoder expects.
    #[error("malformed custom entity of type {type_name}: {reason}")]
    MalformedCustomEntity { type_name: String, reason: String },

    /// JSON (de)serialization failure outside the schema-fetch path.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The dump was cancelled before completion; no partial state is
    /// returned to the caller (see invariant 7).
    #[error("dump cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Self {
        Error::Transport {
            kind: "unknown".to_string(),
            source,
        }
    }
}

impl Error {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn already_exists(kind: &'static str, key: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            key: key.into(),
        }
    }

    pub fn transport(kind: impl Into<String>, source: reqwest::Error) -> Self {
        Error::Transport {
            kind: kind.into(),
            source,
        }
    }
}
