//! Circuit-breaker gating for protected dependencies.

use futures_util::future::{BoxFuture, FutureExt};

use crate::resilience::CircuitBreakers;
use crate::transport::{Endpoint, FetchResult, Transport};

/// Routes calls to protected dependencies through their breaker.
///
/// Calls to unprotected dependencies pass straight through.
pub struct GuardedTransport<T> {
    inner: T,
    breakers: CircuitBreakers,
}

impl<T: Transport> GuardedTransport<T> {
    pub fn new(inner: T, breakers: CircuitBreakers) -> Self {
        Self { inner, breakers }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }
}

impl<T: Transport> Transport for GuardedTransport<T> {
    type Payload = T::Payload;

    fn perform<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, FetchResult<Self::Payload>> {
        let dependency = endpoint.dependency.as_str();
        if !self.breakers.is_protected(dependency) {
            return self.inner.perform(endpoint);
        }

        let breaker = self.breakers.get_or_create(dependency);
        async move { breaker.call(|| self.inner.perform(endpoint)).await }.boxed()
    }
}
