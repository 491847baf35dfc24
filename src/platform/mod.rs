pub mod slack;

use async_trait::async_trait;

use crate::error::Result;

/// The chat platform's side of moderation: fetch shared files, remove them,
/// and talk back to the channel.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Download a private file with the bot's credentials.
    async fn download_file(&self, url: &str) -> Result<Vec<u8>>;

    async fn delete_file(&self, file_id: &str) -> Result<()>;

    async fn post_message(&self, channel: &str, text: &str) -> Result<()>;
}
