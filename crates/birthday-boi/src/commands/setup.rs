//! `/setup_birthday_boi`: choose the announcement channel for this guild.

use serenity::all::CommandInteraction;
use serenity::client::Context;
use tracing::info;

use crate::discord::Handler;
use crate::error::CommandError;

use super::{channel_option, reply, require_guild};

pub async fn run(
    handler: &Handler,
    ctx: &Context,
    command: &CommandInteraction,
) -> Result<(), CommandError> {
    command.defer(&ctx.http).await.map_err(CommandError::Discord)?;

    let guild_id = require_guild(command)?;
    let channel =
        channel_option(command, "channel").ok_or(CommandError::MissingOption("channel"))?;

    handler
        .store
        .upsert_guild_config(guild_id.get(), channel.get())
        .await
        .map_err(CommandError::Store)?;

    info!(
        guild_id = guild_id.get(),
        channel_id = channel.get(),
        "Guild set up"
    );

    reply(
        ctx,
        command,
        format!(
            "Birthday bot has been set up successfully! \
             Birthday announcements will be sent to <#{}>.",
            channel.get()
        ),
    )
    .await
}
