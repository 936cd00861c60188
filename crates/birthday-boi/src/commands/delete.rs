//! `/delete_birthday`: remove the caller's birthday and sign role.

use serenity::all::CommandInteraction;
use serenity::client::Context;
use tracing::warn;

use crate::discord::Handler;
use crate::error::CommandError;
use crate::zodiac;

use super::{followup_ephemeral, reply, require_guild};

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
    let user_id = command.user.id;

    let deleted = handler
        .store
        .delete_birthday(guild_id.get(), user_id.get())
        .await
        .map_err(CommandError::Store)?;
    if !deleted {
        return Err(CommandError::NoBirthday);
    }

    reply(ctx, command, "Your birthday information has been deleted.").await?;

    match zodiac::remove_roles(&ctx.http, guild_id, user_id).await {
        Ok(true) => {
            followup_ephemeral(ctx, command, "Your zodiac sign role has been removed.").await?;
        }
        Ok(false) => {}
        Err(e) => warn!(
            guild_id = guild_id.get(),
            user_id = user_id.get(),
            error = %e,
            "Failed to remove zodiac roles"
        ),
    }

    Ok(())
}
