//! Reply publishing for scoring results and errors

use crate::error::ScoringError;
use crate::types::request::ErrorReply;
use anyhow::Result;
use async_nats::{Client, Subject};
use serde::Serialize;
use tracing::{debug, warn};

/// Publishes replies to the reply subject carried by each request
#[derive(Clone)]
pub struct ResponsePublisher {
    client: Client,
}

impl ResponsePublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publish any serializable body. Requests without a reply subject are
    /// fire-and-forget; their result is dropped.
    pub async fn reply<T: Serialize>(&self, reply_to: Option<&Subject>, body: &T) -> Result<()> {
        let Some(reply_to) = reply_to else {
            warn!("Request carried no reply subject, dropping result");
            return Ok(());
        };

        let payload = serde_json::to_vec(body)?;
        self.client.publish(reply_to.clone(), payload.into()).await?;

        debug!(reply_to = %reply_to, "Published reply");
        Ok(())
    }

    pub async fn reply_error(&self, reply_to: Option<&Subject>, err: &ScoringError) -> Result<()> {
        self.reply(reply_to, &ErrorReply::from(err)).await
    }
}
