pub mod config;
pub mod error;
pub mod metrics;
pub mod query;
pub mod types;

pub use config::*;
pub use error::{GossipError, MembershipError, RespondError};
pub use query::{NodeResponse, Query, QueryParams, QueryResponse};
pub use types::*;
