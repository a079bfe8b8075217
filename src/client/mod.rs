//! Remote authority client
//!
//! - `types` - wire types for progress payloads and authority answers
//! - `graphql` - GraphQL-over-HTTP client, query builders and endpoint URLs

mod graphql;
mod types;

pub use graphql::*;
pub use types::*;
