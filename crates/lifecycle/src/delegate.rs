//! Hooks run while an instance leaves the ring.

use async_trait::async_trait;

/// Hands data owned by a leaving instance to someone else.
///
/// On `leave`, `transfer_out` runs first; when it fails, `flush` is the
/// fallback. Errors from `flush` are logged and do not stop the shutdown.
#[async_trait]
pub trait FlushTransferer: Send + Sync {
    /// Move in-memory data to another member.
    async fn transfer_out(&self) -> anyhow::Result<()>;

    /// Persist in-memory data to long-term storage.
    async fn flush(&self) -> anyhow::Result<()>;
}

/// For instances that hold no data.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopFlushTransferer;

#[async_trait]
impl FlushTransferer for NoopFlushTransferer {
    async fn transfer_out(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
