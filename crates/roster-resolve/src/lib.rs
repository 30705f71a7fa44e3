//! The identity resolution and enrichment engine.
//!
//! External sources sit behind [`ProfileApi`], [`Geocoder`] and
//! [`Directory`], each with one HTTP implementation. Their cached fronts,
//! the [`OrganizationMatcher`], and the snapshot index are composed into an
//! [`IdentityMerger`], which the [`ResolutionScheduler`] runs once per
//! observed account.

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod export;
pub mod geo;
pub mod github;
pub mod matcher;
pub mod merger;
pub mod scheduler;
pub mod seed;
pub mod snapshot;

pub use cache::ResponseCache;
pub use config::Config;
pub use directory::{Directory, EmployeeRegistry, LarkDirectory};
pub use error::{Error, Result};
pub use export::export_snapshot;
pub use geo::{GeoResolver, Geocoder, GoogleGeocoder, Location};
pub use github::{GitHubHttp, ProfileApi, ProfileClient};
pub use matcher::OrganizationMatcher;
pub use merger::{IdentityMerger, Outcome, Resolve};
pub use scheduler::{CacheCheckpoint, ResolutionScheduler, RunSummary};
pub use seed::seed;
pub use snapshot::load_snapshot;
