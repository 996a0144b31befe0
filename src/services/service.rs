use crate::error::Result;
use tokio::sync::oneshot;

/// Trait for long-running services started from `main`
#[async_trait::async_trait]
pub trait Service: Send {
    /// Run until `shutdown` fires or the service's input ends.
    /// Teardown happens before this returns.
    async fn run(self: Box<Self>, shutdown: oneshot::Receiver<()>) -> Result<()>;
}
