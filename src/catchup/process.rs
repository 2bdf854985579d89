//! The catch-up FSM itself (§4.7): re-reads `turbulence_start` every round,
//! pages historical events from the event store, replays them through the
//! projection, and hands off to live delivery once the turbulence window is
//! closed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::state::{CatchUpEvent, CatchUpRequest, CatchUpState, CatchUpStatus};
use crate::error::Error;
use crate::external::{EventStore, EventStoreQuery};
use crate::inbox::{DispatchEndpoint, InboxStorage, ShardingStrategy};
use crate::signal::{EntityId, Envelope};

/// Drives one catch-up process to completion, one round at a time.
///
/// Replayed events are deduplicated against the same delivered-index live
/// delivery uses (§4.7: "no signal appears in both replay and live
/// delivery"), so a historical event already delivered live — or a live
/// event that arrives mid-replay — is folded exactly once either way.
pub struct CatchUpProcess {
    state: CatchUpState,
    event_store: Arc<dyn EventStore<Envelope>>,
    inbox_storage: Arc<dyn InboxStorage>,
    sharding: Arc<dyn ShardingStrategy>,
    apply: DispatchEndpoint,
    page_size: usize,
    idempotence_window: Duration,
    turbulence_period: Duration,
}

impl CatchUpProcess {
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        request: CatchUpRequest,
        total_shards: u32,
        event_store: Arc<dyn EventStore<Envelope>>,
        inbox_storage: Arc<dyn InboxStorage>,
        sharding: Arc<dyn ShardingStrategy>,
        apply: DispatchEndpoint,
        page_size: usize,
        idempotence_window: Duration,
        turbulence_period: Duration,
    ) -> Self {
        Self {
            state: CatchUpState::new(request, total_shards),
            event_store,
            inbox_storage,
            sharding,
            apply,
            page_size,
            idempotence_window,
            turbulence_period,
        }
    }

    pub fn state(&self) -> &CatchUpState {
        &self.state
    }

    fn target_for(&self, event: &Envelope) -> Option<EntityId> {
        if let Some(target) = self.state.request.target_ids.first() {
            return Some(target.clone());
        }
        event
            .producer_id
            .as_ref()
            .map(|producer_id| EntityId::new(self.state.projection_type, producer_id.as_str().as_bytes().to_vec()))
    }

    /// Run a single round of the FSM. Returns the notifications emitted by
    /// this round (§4.7's transition labels); empty once `COMPLETED` has
    /// already been reached.
    pub async fn run_round(&mut self) -> Result<Vec<CatchUpEvent>, Error> {
        if self.state.is_terminal() {
            return Ok(Vec::new());
        }

        let turbulence_start = Utc::now() - self.turbulence_period;
        let until = match self.state.status {
            CatchUpStatus::Started => turbulence_start,
            CatchUpStatus::Finalizing => Utc::now(),
            CatchUpStatus::Undefined | CatchUpStatus::Completed => unreachable!("handled above"),
        };

        let page = self
            .event_store
            .read(EventStoreQuery {
                event_types: self.state.request.event_types.clone(),
                since: self.state.when_last_read,
                until,
                limit: self.page_size,
            })
            .await?;

        self.state.current_round += 1;

        if page.events.is_empty() {
            return self.on_empty_page();
        }

        let applied = self.replay_page(&page.events).await?;

        if let Some(last_ts) = page.last_timestamp {
            self.state.when_last_read = last_ts;
        }

        Ok(vec![match self.state.status {
            CatchUpStatus::Started => CatchUpEvent::HistoryEventsRecalled { count: applied },
            CatchUpStatus::Finalizing => CatchUpEvent::LiveEventsPickedUp { count: applied },
            CatchUpStatus::Undefined | CatchUpStatus::Completed => unreachable!("handled above"),
        }])
    }

    fn on_empty_page(&mut self) -> Result<Vec<CatchUpEvent>, Error> {
        match self.state.status {
            CatchUpStatus::Started => {
                self.state.status = CatchUpStatus::Finalizing;
                Ok(vec![CatchUpEvent::HistoryFullyRecalled])
            }
            CatchUpStatus::Finalizing => {
                self.state.status = CatchUpStatus::Completed;
                let mut emitted = vec![CatchUpEvent::CatchUpCompleted];
                emitted.extend(
                    self.state
                        .affected_shards
                        .iter()
                        .copied()
                        .map(|shard| CatchUpEvent::ShardProcessingRequested { shard }),
                );
                Ok(emitted)
            }
            CatchUpStatus::Undefined | CatchUpStatus::Completed => unreachable!("handled above"),
        }
    }

    async fn replay_page(&mut self, events: &[Envelope]) -> Result<usize, Error> {
        let now = Utc::now();
        let mut applied = 0usize;

        for event in events {
            let Some(target) = self.target_for(event) else {
                tracing::warn!(signal = %event.id, "event carries no producer id and no explicit target was requested; skipping");
                continue;
            };

            let shard = self.sharding.shard_for(&target, self.state.total_shards);
            self.state.affected_shards.insert(shard);

            match self.inbox_storage.is_delivered_within_window(event.id, now).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(signal = %event.id, error = %e, "failed to check delivery window during catch-up replay");
                }
            }

            (self.apply)(event.clone()).await?;
            applied += 1;

            if let Err(e) = self
                .inbox_storage
                .mark_delivered(shard, &[event.id], now, self.idempotence_window)
                .await
            {
                tracing::error!(signal = %event.id, error = %e, "failed to record catch-up replay in delivered index");
            }
        }

        Ok(applied)
    }
}
