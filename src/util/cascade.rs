//! Ordered fallback evaluation
//!
//! A [`Cascade`] holds named steps that are only built and run when every
//! earlier step has failed. The first success wins; failures are logged and
//! never surfaced individually.

use crate::error::Error;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

/// A boxed in-flight step
pub type Attempt<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

type Step<'a, T> = Box<dyn FnOnce() -> Attempt<'a, T> + Send + 'a>;

/// Chain of lazily evaluated resolution strategies
pub struct Cascade<'a, T> {
    what: &'static str,
    steps: Vec<(String, Step<'a, T>)>,
}

impl<'a, T: 'a> Cascade<'a, T> {
    /// Start an empty cascade; `what` names the resource in log lines
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn step<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, Error>> + Send + 'a,
    {
        self.steps
            .push((name.into(), Box::new(move || Box::pin(f()) as Attempt<'a, T>)));
        self
    }

    /// Run steps in order until one succeeds
    pub async fn run(self) -> Option<T> {
        let Self { what, steps } = self;

        for (name, step) in steps {
            debug!("{}: trying {}", what, name);
            match step().await {
                Ok(value) => {
                    info!("{}: using {}", what, name);
                    return Some(value);
                },
                Err(e) => {
                    warn!("{}: {} rejected: {}", what, name, e);
                    continue;
                },
            }
        }

        warn!("{}: no candidate left", what);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_success_wins_and_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (c1, c2, c3) = (calls.clone(), calls.clone(), calls.clone());

        let result = Cascade::new("test")
            .step("fails", move || async move {
                c1.fetch_add(1, Ordering::SeqCst);
                Err(Error::NotFound("first".into()))
            })
            .step("succeeds", move || async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .step("never", move || async move {
                c3.fetch_add(100, Ordering::SeqCst);
                Ok(3)
            })
            .run()
            .await;

        assert_eq!(result, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_yields_none() {
        let result: Option<u8> = Cascade::new("test")
            .step("a", || async { Err(Error::NotFound("a".into())) })
            .step("b", || async { Err(Error::Invalid("b".into())) })
            .run()
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_empty_cascade() {
        let cascade: Cascade<'_, ()> = Cascade::new("test");
        assert!(cascade.run().await.is_none());
    }
}
