//! Change notification.
//!
//! Events are serialized into `Publish` operations of the same batch that
//! commits the change, so a rejected or failed commit publishes nothing and
//! events for one id reach subscribers in commit order.

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use kvmodel_store::{Batch, KeySpace, StoreError};
use kvmodel_types::{ChangeEvent, EntityId, EventKind, EventPayload};
use tokio::sync::broadcast;
use tracing::warn;

/// Appends a publication of `payload` for `(model, id)` to `batch`.
pub(crate) fn publish_op(
    keys: &KeySpace,
    model: &str,
    id: &EntityId,
    payload: EventPayload,
    batch: &mut Batch,
) -> EngineResult<()> {
    let event = ChangeEvent::new(model, id.clone(), payload);
    let channel = keys.channel(model, event.kind().as_str());
    batch.publish(channel, serde_json::to_string(&event)?);
    Ok(())
}

/// A stream of change events of one kind for one model.
#[derive(Debug)]
pub struct Subscription {
    model: String,
    kind: EventKind,
    receiver: broadcast::Receiver<String>,
}

impl Subscription {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Waits for the next event.
    ///
    /// Messages dropped because this subscriber lagged are logged and skipped.
    pub async fn recv(&mut self) -> EngineResult<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Ok(serde_json::from_str(&message)?),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(model = %self.model, kind = %self.kind, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EngineError::Store(StoreError::ChannelClosed));
                }
            }
        }
    }

    /// Returns the next event if one is already buffered.
    pub fn try_recv(&mut self) -> EngineResult<Option<ChangeEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Ok(Some(serde_json::from_str(&message)?)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(model = %self.model, kind = %self.kind, skipped, "subscriber lagged");
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EngineError::Store(StoreError::ChannelClosed));
                }
            }
        }
    }
}

impl Engine {
    /// Subscribes to events of `kind` for `model`.
    pub async fn subscribe(&self, model: &str, kind: EventKind) -> EngineResult<Subscription> {
        self.registry().require(model)?;
        let receiver = self.store().subscribe(&self.keys().channel(model, kind.as_str())).await?;
        Ok(Subscription {
            model: model.to_string(),
            kind,
            receiver,
        })
    }
}
