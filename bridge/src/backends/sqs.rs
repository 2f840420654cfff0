//! Write-only SQS backend. Records are sent as JSON messages to the queue
//! named by the model's table name.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{Backend, Model, Page, Query, Record};
use crate::{Error, Result};

/// Minimal queue client surface.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn send_message(&self, queue_url: &str, body: String) -> Result<()>;
}

#[async_trait]
impl MessageQueue for aws_sdk_sqs::Client {
    async fn send_message(&self, queue_url: &str, body: String) -> Result<()> {
        self.send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to send message to {}: {}", queue_url, e)))?;
        Ok(())
    }
}

#[async_trait]
impl<Q: MessageQueue + ?Sized> MessageQueue for std::sync::Arc<Q> {
    async fn send_message(&self, queue_url: &str, body: String) -> Result<()> {
        (**self).send_message(queue_url, body).await
    }
}

/// SQS wrapper.
pub struct SqsBackend<Q = aws_sdk_sqs::Client> {
    queue: Q,
}

impl<Q: MessageQueue> SqsBackend<Q> {
    pub fn new(queue: Q) -> Self {
        Self { queue }
    }

    fn unsupported<T>(operation: &str) -> Result<T> {
        Err(Error::Unsupported(format!("SQS backend cannot {}", operation)))
    }
}

#[async_trait]
impl<Q: MessageQueue> Backend for SqsBackend<Q> {
    async fn create(&self, data: Record, model: &Model) -> Result<Record> {
        let body = serde_json::to_string(&data)?;
        MessageQueue::send_message(&self.queue, &model.table_name, body).await?;
        info!(queue = %model.table_name, "Queued record");
        Ok(data)
    }

    async fn read(&self, _id: &Value, _model: &Model) -> Result<Option<Record>> {
        Self::unsupported("read")
    }

    async fn update(&self, _id: &Value, _data: Record, _model: &Model) -> Result<Record> {
        Self::unsupported("update")
    }

    async fn delete(&self, _id: &Value, _model: &Model) -> Result<()> {
        Self::unsupported("delete")
    }

    async fn query(&self, _query: &Query, _model: &Model) -> Result<Page> {
        Self::unsupported("query")
    }

    async fn count(&self, _query: &Query, _model: &Model) -> Result<usize> {
        Self::unsupported("count")
    }
}
