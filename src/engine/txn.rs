use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// What a transaction body decided: the single event to commit and the value
/// handed back to the caller once the event is durable.
pub(super) struct Commit<T> {
    pub event: Event,
    pub value: T,
}

impl<T> Commit<T> {
    pub fn new(event: Event, value: T) -> Self {
        Self { event, value }
    }
}

impl Engine {
    /// Run `body` against the spot under its write lock, then persist and apply
    /// the event it returns. `now` is read after the lock is taken.
    pub(super) async fn transact<T, F>(&self, spot_id: Ulid, body: F) -> Result<T, EngineError>
    where
        F: FnOnce(&SpotState, Ms) -> Result<Commit<T>, EngineError> + Send,
        T: Send,
    {
        self.transact_inner(spot_id, None, body).await
    }

    /// Same as [`transact`](Self::transact) with a caller-fixed `now`.
    pub(super) async fn transact_at<T, F>(
        &self,
        spot_id: Ulid,
        now: Ms,
        body: F,
    ) -> Result<T, EngineError>
    where
        F: FnOnce(&SpotState, Ms) -> Result<Commit<T>, EngineError> + Send,
        T: Send,
    {
        self.transact_inner(spot_id, Some(now), body).await
    }

    /// Transaction on the spot holding `rent_id`. The body receives the rent as
    /// loaded under the lock.
    pub(super) async fn transact_rent<T, F>(
        &self,
        rent_id: Ulid,
        now: Option<Ms>,
        body: F,
    ) -> Result<T, EngineError>
    where
        F: FnOnce(&SpotState, &Rent, Ms) -> Result<Commit<T>, EngineError> + Send,
        T: Send,
    {
        let spot_id = self
            .get_spot_for_rent(&rent_id)
            .ok_or(EngineError::NotFound(rent_id))?;
        self.transact_inner(spot_id, now, move |ss, now| {
            let rent = ss.rent(rent_id).ok_or(EngineError::NotFound(rent_id))?;
            body(ss, rent, now)
        })
        .await
    }

    async fn transact_inner<T, F>(
        &self,
        spot_id: Ulid,
        now: Option<Ms>,
        body: F,
    ) -> Result<T, EngineError>
    where
        F: FnOnce(&SpotState, Ms) -> Result<Commit<T>, EngineError> + Send,
        T: Send,
    {
        let ss = self
            .get_spot_state(&spot_id)
            .ok_or(EngineError::NotFound(spot_id))?;
        let mut guard = ss.write().await;
        // Deleted or purged while we waited for the lock.
        let still_registered = self
            .spots
            .get(&spot_id)
            .is_some_and(|e| Arc::ptr_eq(e.value(), &ss));
        if !still_registered {
            return Err(EngineError::NotFound(spot_id));
        }
        let now = now.unwrap_or_else(|| self.now_ms());

        let commit = match panic::catch_unwind(AssertUnwindSafe(|| body(&*guard, now))) {
            Ok(result) => result?,
            Err(_) => {
                tracing::error!(%spot_id, "transaction body panicked, nothing written");
                return Err(EngineError::Internal);
            }
        };

        self.persist_and_apply(&mut *guard, &commit.event).await?;
        Ok(commit.value)
    }
}
