use async_trait::async_trait;

use crate::messages::InboundMessage;

/// Destination for inbound messages.
///
/// Delivery is best effort: implementations log failures and never report
/// them back to the session side.
#[async_trait]
pub trait MessageRelay: Send + Sync {
    /// Deliver one message. Returns whether the destination accepted it.
    async fn forward(&self, message: &InboundMessage) -> bool;
}
