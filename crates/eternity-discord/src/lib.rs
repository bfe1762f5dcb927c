//! Minimal Discord REST client used as the directory source and notification sink.

pub mod model;

use eternity_core::{DirectorySource, NotificationSink, UpstreamError};
use eternity_models::{RawMember, Role};
use eternity_util::chunk::{split_message, MESSAGE_LIMIT};
use model::{ChannelObject, CreateDm, MemberObject, MessageContent, MessageObject, RoleObject};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const MEMBER_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("discord returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid snowflake '{0}'")]
    InvalidId(String),
}

impl From<DiscordError> for UpstreamError {
    fn from(err: DiscordError) -> Self {
        UpstreamError::new(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct DiscordClient {
    http: Client,
    base_url: String,
    token: String,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DiscordError> {
        Self::with_base_url(DEFAULT_API_BASE, token, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DiscordError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("EternityBot (", env!("CARGO_PKG_VERSION"), ")"))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, DiscordError> {
        let resp = request
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DiscordError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }

    pub async fn guild_roles(&self, guild_id: i64) -> Result<Vec<Role>, DiscordError> {
        let roles: Vec<RoleObject> = self
            .send(self.http.get(self.url(&format!("/guilds/{guild_id}/roles"))))
            .await?;
        roles.into_iter().map(Role::try_from).collect()
    }

    /// Every guild member, following `after` cursors one page at a time.
    pub async fn guild_members(&self, guild_id: i64) -> Result<Vec<RawMember>, DiscordError> {
        let mut members = Vec::new();
        let mut after: i64 = 0;
        loop {
            let url = self.url(&format!(
                "/guilds/{guild_id}/members?limit={MEMBER_PAGE_LIMIT}&after={after}"
            ));
            let page: Vec<MemberObject> = self.send(self.http.get(url)).await?;
            let page_len = page.len();
            let cursor = after;
            for object in page {
                if let Some(member) = object.into_raw_member()? {
                    after = after.max(member.id);
                    members.push(member);
                }
            }
            if page_len < MEMBER_PAGE_LIMIT {
                break;
            }
            if after == cursor {
                tracing::warn!(
                    "discord: member page after {} of guild {} did not advance the cursor",
                    cursor,
                    guild_id
                );
                break;
            }
        }
        tracing::debug!("discord: fetched {} members of guild {}", members.len(), guild_id);
        Ok(members)
    }

    pub async fn open_dm(&self, user_id: i64) -> Result<i64, DiscordError> {
        let channel: ChannelObject = self
            .send(self.http.post(self.url("/users/@me/channels")).json(&CreateDm {
                recipient_id: user_id.to_string(),
            }))
            .await?;
        model::parse_snowflake(&channel.id)
    }

    /// Post `content`, split into as many messages as the length limit requires.
    /// Returns the id of the last message posted.
    pub async fn create_message(&self, channel_id: i64, content: &str) -> Result<i64, DiscordError> {
        let url = self.url(&format!("/channels/{channel_id}/messages"));
        let mut last_id = 0;
        for chunk in split_message(content, MESSAGE_LIMIT) {
            let message: MessageObject = self
                .send(self.http.post(&url).json(&MessageContent { content: &chunk }))
                .await?;
            last_id = model::parse_snowflake(&message.id)?;
        }
        Ok(last_id)
    }

    /// Replace a message's content. Text beyond the length limit is dropped.
    pub async fn edit_message(
        &self,
        channel_id: i64,
        message_id: i64,
        content: &str,
    ) -> Result<(), DiscordError> {
        let mut chunks = split_message(content, MESSAGE_LIMIT);
        if chunks.len() > 1 {
            tracing::warn!(
                "discord: edit of message {} truncated to {} characters",
                message_id,
                MESSAGE_LIMIT
            );
        }
        let first = if chunks.is_empty() {
            String::new()
        } else {
            chunks.swap_remove(0)
        };
        let url = self.url(&format!("/channels/{channel_id}/messages/{message_id}"));
        let _: MessageObject = self
            .send(self.http.patch(url).json(&MessageContent { content: &first }))
            .await?;
        Ok(())
    }
}

impl DirectorySource for DiscordClient {
    async fn fetch_roles(&self, guild_id: i64) -> Result<Vec<Role>, UpstreamError> {
        Ok(self.guild_roles(guild_id).await?)
    }

    async fn fetch_members(&self, guild_id: i64) -> Result<Vec<RawMember>, UpstreamError> {
        Ok(self.guild_members(guild_id).await?)
    }
}

impl NotificationSink for DiscordClient {
    async fn send_direct(&self, user_id: i64, text: &str) -> Result<(), UpstreamError> {
        let channel_id = self.open_dm(user_id).await?;
        self.create_message(channel_id, text).await?;
        Ok(())
    }

    async fn send_channel(&self, channel_id: i64, text: &str) -> Result<(), UpstreamError> {
        self.create_message(channel_id, text).await?;
        Ok(())
    }

    async fn edit_message(
        &self,
        channel_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), UpstreamError> {
        DiscordClient::edit_message(self, channel_id, message_id, text).await?;
        Ok(())
    }
}
