use crate::error::UpstreamError;
use std::future::Future;

/// Outbound messaging: direct messages, channel posts and in-place edits.
pub trait NotificationSink: Send + Sync + 'static {
    fn send_direct(
        &self,
        user_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<(), UpstreamError>> + Send;

    fn send_channel(
        &self,
        channel_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<(), UpstreamError>> + Send;

    fn edit_message(
        &self,
        channel_id: i64,
        message_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<(), UpstreamError>> + Send;
}
