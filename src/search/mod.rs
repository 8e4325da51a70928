//! Search-provider abstraction.
//!
//! Research units gather evidence through the [`SearchProvider`] trait;
//! the engine never assumes a particular backend. The bundled [`tavily`]
//! provider covers the common hosted case.

pub mod tavily;

use crate::types::{SearchError, SearchResponse};
use async_trait::async_trait;

/// A web (or corpus) search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query and return its raw results.
    ///
    /// Failures are always unit-local: the supervisor records a failing
    /// unit as empty notes and keeps its siblings running.
    async fn search(&self, query: &str) -> Result<SearchResponse, SearchError>;

    /// Human-readable provider name for logs.
    fn name(&self) -> &str;
}
