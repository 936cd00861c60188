//! `/delete_setup`: admin-only removal of all data the bot holds for a
//! guild. The configuration row and every birthday go in one transaction.

use serenity::all::CommandInteraction;
use serenity::client::Context;
use tracing::info;

use crate::discord::Handler;
use crate::error::CommandError;

use super::{reply, require_guild};

pub async fn run(
    handler: &Handler,
    ctx: &Context,
    command: &CommandInteraction,
) -> Result<(), CommandError> {
    command
        .defer_ephemeral(&ctx.http)
        .await
        .map_err(CommandError::Discord)?;

    let guild_id = require_guild(command)?;

    let existed = handler
        .store
        .delete_guild_data(guild_id.get())
        .await
        .map_err(CommandError::Store)?;
    if !existed {
        return Err(CommandError::NotConfigured);
    }

    info!(guild_id = guild_id.get(), "Guild data deleted");

    reply(
        ctx,
        command,
        "All server data has been deleted successfully. The birthday bot setup and all \
         birthday data for this server have been removed.",
    )
    .await
}
