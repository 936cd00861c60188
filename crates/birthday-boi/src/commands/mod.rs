//! Slash-command handlers. Each submodule implements one command; the
//! dispatcher in `discord` maps a returned `CommandError` to an ephemeral
//! reply with its user-facing message.

pub mod delete;
pub mod edit;
pub mod list;
pub mod set;
pub mod setup;
pub mod teardown;

use serenity::all::{
    ChannelId, CommandInteraction, CreateInteractionResponseFollowup, EditInteractionResponse,
    GuildId,
};
use serenity::client::Context;

use crate::error::CommandError;

pub(crate) fn require_guild(command: &CommandInteraction) -> Result<GuildId, CommandError> {
    command.guild_id.ok_or(CommandError::GuildOnly)
}

pub(crate) fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_i64())
}

pub(crate) fn str_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
}

pub(crate) fn channel_option(command: &CommandInteraction, name: &str) -> Option<ChannelId> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_channel_id())
}

/// Edits the deferred response with the final reply.
pub(crate) async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    text: impl Into<String>,
) -> Result<(), CommandError> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(text))
        .await
        .map_err(CommandError::Discord)?;
    Ok(())
}

/// Sends an additional ephemeral follow-up after the main reply.
pub(crate) async fn followup_ephemeral(
    ctx: &Context,
    command: &CommandInteraction,
    text: impl Into<String>,
) -> Result<(), CommandError> {
    command
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new()
                .content(text)
                .ephemeral(true),
        )
        .await
        .map_err(CommandError::Discord)?;
    Ok(())
}
