//! Subset of the Discord REST objects the bot reads.

use crate::DiscordError;
use eternity_models::{RawMember, Role};
use serde::{Deserialize, Serialize};

pub(crate) fn parse_snowflake(raw: &str) -> Result<i64, DiscordError> {
    raw.parse::<i64>()
        .map_err(|_| DiscordError::InvalidId(raw.to_string()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleObject {
    pub id: String,
    pub name: String,
}

impl TryFrom<RoleObject> for Role {
    type Error = DiscordError;

    fn try_from(role: RoleObject) -> Result<Self, Self::Error> {
        Ok(Role {
            id: parse_snowflake(&role.id)?,
            name: role.name,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserObject {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberObject {
    #[serde(default)]
    pub user: Option<UserObject>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl MemberObject {
    /// Only the guild nickname carries a level; members without one get an empty nickname.
    pub fn into_raw_member(self) -> Result<Option<RawMember>, DiscordError> {
        let Some(user) = self.user else {
            return Ok(None);
        };
        let role_ids = self
            .roles
            .iter()
            .map(|id| parse_snowflake(id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(RawMember {
            id: parse_snowflake(&user.id)?,
            raw_nickname: self.nick.unwrap_or_default(),
            role_ids,
            is_bot: user.bot,
        }))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelObject {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageObject {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateDm {
    pub recipient_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageContent<'a> {
    pub content: &'a str,
}
