//! The user-supplied data source.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use crate::batch::keys::Params;
use crate::error::ResolverError;

/// Tags accumulated per id for one dispatch, in registration order.
pub type BatchMetadata = HashMap<String, Vec<Value>>;

/// Fetches many ids in one round-trip.
///
/// The response is handed to the store's parser: by default an array of
/// records carrying an `id` field, or an object keyed by id. Ids missing
/// from the response resolve as absent.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    async fn resolve(
        &self,
        ids: Vec<String>,
        params: Params,
        metadata: BatchMetadata,
    ) -> Result<Value, ResolverError>;
}

/// Adapter returned by [`resolver_fn`].
pub struct FnResolver<F> {
    f: F,
}

/// Use an async closure as a resolver.
pub fn resolver_fn<F, Fut>(f: F) -> FnResolver<F>
where
    F: Fn(Vec<String>, Params, BatchMetadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ResolverError>> + Send + 'static,
{
    FnResolver { f }
}

#[async_trait]
impl<F, Fut> Resolver for FnResolver<F>
where
    F: Fn(Vec<String>, Params, BatchMetadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ResolverError>> + Send + 'static,
{
    async fn resolve(
        &self,
        ids: Vec<String>,
        params: Params,
        metadata: BatchMetadata,
    ) -> Result<Value, ResolverError> {
        (self.f)(ids, params, metadata).await
    }
}
