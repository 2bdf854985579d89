//! The ordered filter chain a signal passes through before routing (§4.1 step 3).

use async_trait::async_trait;

use crate::error::{Ack, IgnoreReason};

/// What a single filter decided to do with a message.
pub enum FilterDecision<M> {
    /// Let the message continue to the next filter, and eventually to routing.
    Continue(M),
    /// Stop the chain and report the given ack without ever routing.
    ShortCircuit(Ack),
    /// Stop the chain silently (no ack reported beyond `Ignored`).
    Drop(IgnoreReason),
}

/// One stage of a bus's filter chain (e.g. `pre-dispatch`, `scheduled`, `dedup`).
#[async_trait]
pub trait Filter<M: Send>: Send + Sync {
    async fn apply(&self, message: M) -> FilterDecision<M>;

    /// A short, stable name used in logs when this filter drops a message.
    fn name(&self) -> &'static str;
}

/// An ordered sequence of filters, each of which may short-circuit or drop
/// the message before the next one runs.
#[derive(Default)]
pub struct FilterChain<M> {
    filters: Vec<Box<dyn Filter<M>>>,
}

impl<M: Send + 'static> FilterChain<M> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn push(&mut self, filter: Box<dyn Filter<M>>) {
        self.filters.push(filter);
    }

    /// Run `message` through every filter in order. Returns `Ok(message)` if
    /// it survived all of them, or the terminal decision otherwise.
    pub async fn run(&self, mut message: M) -> Result<M, FilterOutcome> {
        for filter in &self.filters {
            match filter.apply(message).await {
                FilterDecision::Continue(m) => message = m,
                FilterDecision::ShortCircuit(ack) => return Err(FilterOutcome::Acked(ack)),
                FilterDecision::Drop(reason) => {
                    tracing::debug!(filter = filter.name(), ?reason, "message dropped by filter");
                    return Err(FilterOutcome::Dropped(reason));
                }
            }
        }
        Ok(message)
    }
}

/// Why `FilterChain::run` returned early.
pub enum FilterOutcome {
    Acked(Ack),
    Dropped(IgnoreReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysDrop;

    #[async_trait]
    impl Filter<u32> for AlwaysDrop {
        async fn apply(&self, _message: u32) -> FilterDecision<u32> {
            FilterDecision::Drop(IgnoreReason::FilteredOut)
        }

        fn name(&self) -> &'static str {
            "always_drop"
        }
    }

    struct Increment;

    #[async_trait]
    impl Filter<u32> for Increment {
        async fn apply(&self, message: u32) -> FilterDecision<u32> {
            FilterDecision::Continue(message + 1)
        }

        fn name(&self) -> &'static str {
            "increment"
        }
    }

    #[tokio::test]
    async fn chain_passes_message_through_surviving_filters() {
        let mut chain = FilterChain::new();
        chain.push(Box::new(Increment));
        chain.push(Box::new(Increment));
        let result = chain.run(0).await.unwrap();
        assert_eq!(result, 2);
    }

    #[tokio::test]
    async fn chain_stops_at_first_drop() {
        let mut chain: FilterChain<u32> = FilterChain::new();
        chain.push(Box::new(AlwaysDrop));
        chain.push(Box::new(Increment));
        let err = chain.run(0).await.unwrap_err();
        assert!(matches!(err, FilterOutcome::Dropped(IgnoreReason::FilteredOut)));
    }
}
