//! Service discovery poll loop
//!
//! Fetches a Prometheus file_sd target list from an HTTP endpoint on a fixed
//! interval, rejects malformed or degenerate responses and replaces the local
//! target file with every valid one.

pub mod error;
pub mod fetcher;
pub mod model;
pub mod persister;
pub mod poller;
pub mod validator;

pub use error::{FetchError, PollerError, ValidationError, WriteError};
pub use fetcher::{DiscoverySource, HttpFetcher};
pub use model::{DiscoveryResponse, Labels, TargetGroup};
pub use persister::Persister;
pub use poller::{Poller, PollerState};
pub use validator::{MIN_TARGET_GROUPS, validate};
