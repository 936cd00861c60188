//! `/edit_birthday`: update an existing birthday in place.

use chrono::Utc;
use serenity::all::{ChannelId, CommandInteraction};
use serenity::client::Context;
use tracing::warn;

use crate::dates::validate_birth_date;
use crate::discord::Handler;
use crate::error::CommandError;
use crate::store::{BirthdayStore as _, NewBirthday};
use crate::zodiac;

use super::{followup_ephemeral, int_option, reply, require_guild, str_option};

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
    let day = int_option(command, "day").ok_or(CommandError::MissingOption("day"))? as u32;
    let month = int_option(command, "month").ok_or(CommandError::MissingOption("month"))? as u32;
    let year = int_option(command, "year").map(|year| year as i32);
    let timezone = str_option(command, "timezone").unwrap_or("UTC").to_string();

    let now = Utc::now();
    validate_birth_date(day, month, year, now.date_naive())?;

    let guild = handler
        .store
        .get_guild(guild_id.get())
        .await
        .map_err(CommandError::Store)?
        .ok_or(CommandError::NotConfigured)?;

    handler
        .store
        .get_birthday(guild_id.get(), user_id.get())
        .await
        .map_err(CommandError::Store)?
        .ok_or(CommandError::NoBirthday)?;

    handler
        .store
        .upsert_birthday(&NewBirthday {
            guild_id: guild_id.get(),
            user_id: user_id.get(),
            username: command.user.name.clone(),
            day,
            month,
            year,
            timezone,
        })
        .await
        .map_err(CommandError::Store)?;

    let year_text = year.map(|year| format!("/{year}")).unwrap_or_default();
    reply(
        ctx,
        command,
        format!("Your birthday has been updated to {month}/{day}{year_text}."),
    )
    .await?;

    match zodiac::assign_role(&ctx.http, guild_id, user_id, day, month).await {
        Ok(sign) => {
            followup_ephemeral(
                ctx,
                command,
                format!(
                    "You've been assigned the {} role based on your birthday!",
                    sign.name()
                ),
            )
            .await?;
        }
        Err(e) => warn!(
            guild_id = guild_id.get(),
            user_id = user_id.get(),
            error = %e,
            "Failed to assign zodiac role"
        ),
    }

    if let Some(channel) = guild.announcement_channel {
        let scanner = handler.scanner(ctx);
        match scanner
            .check_one(guild_id.get(), user_id.get(), ChannelId::new(channel), now)
            .await
        {
            Ok(true) => {
                followup_ephemeral(
                    ctx,
                    command,
                    "Since today is your birthday, I've sent a birthday announcement to the server!",
                )
                .await?;
            }
            Ok(false) => {}
            Err(e) => warn!(
                guild_id = guild_id.get(),
                user_id = user_id.get(),
                error = %e,
                "Immediate birthday check failed"
            ),
        }
    }

    Ok(())
}
