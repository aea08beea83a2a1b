// Chainable call handle.
//
// An `ApiCall` is cold: nothing is sent until it is awaited (or spawned).
// `success` / `error` register continuations that observe the outcome
// without consuming it, so handles compose the way callback-style
// promise wrappers do while still being plain futures.

use std::fmt;
use std::future::{Future, IntoFuture};

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};

use crate::envelope::ResponseEnvelope;
use crate::error::Error;

/// Result of a dispatched call.
pub type CallResult = Result<ResponseEnvelope, Error>;

/// Cold, chainable handle for one dispatched call.
#[must_use = "an ApiCall does nothing unless awaited"]
pub struct ApiCall {
    inner: BoxFuture<'static, CallResult>,
}

impl ApiCall {
    pub(crate) fn new<F>(fut: F) -> Self
    where
        F: Future<Output = CallResult> + Send + 'static,
    {
        Self { inner: fut.boxed() }
    }

    /// A handle that resolves immediately with `err`.
    pub fn rejected(err: Error) -> Self {
        Self::new(future::ready(Err(err)))
    }

    /// Run `f` with the response if the call succeeds.
    pub fn success<F>(self, f: F) -> Self
    where
        F: FnOnce(&ResponseEnvelope) + Send + 'static,
    {
        Self::new(self.inner.map(|result| {
            if let Ok(response) = &result {
                f(response);
            }
            result
        }))
    }

    /// Run `f` with the error if the call fails.
    pub fn error<F>(self, f: F) -> Self
    where
        F: FnOnce(&Error) + Send + 'static,
    {
        Self::new(self.inner.map(|result| {
            if let Err(err) = &result {
                f(err);
            }
            result
        }))
    }
}

impl IntoFuture for ApiCall {
    type Output = CallResult;
    type IntoFuture = BoxFuture<'static, CallResult>;

    fn into_future(self) -> Self::IntoFuture {
        self.inner
    }
}

impl fmt::Debug for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCall").finish_non_exhaustive()
    }
}
