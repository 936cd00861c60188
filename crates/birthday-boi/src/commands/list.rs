//! `/list_birthdays`: embed of all registered birthdays, grouped by month.

use serenity::all::{CommandInteraction, CreateEmbed, EditInteractionResponse, Timestamp};
use serenity::client::Context;

use crate::discord::Handler;
use crate::error::CommandError;
use crate::store::{BirthdayRecord, BirthdayStore as _};

use super::{reply, require_guild};

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub async fn run(
    handler: &Handler,
    ctx: &Context,
    command: &CommandInteraction,
) -> Result<(), CommandError> {
    command.defer(&ctx.http).await.map_err(CommandError::Discord)?;

    let guild_id = require_guild(command)?;

    handler
        .store
        .get_guild(guild_id.get())
        .await
        .map_err(CommandError::Store)?
        .ok_or(CommandError::NotConfigured)?;

    // Already ordered by (month, day) by the store.
    let birthdays = handler
        .store
        .list_birthdays(guild_id.get())
        .await
        .map_err(CommandError::Store)?;

    if birthdays.is_empty() {
        return reply(
            ctx,
            command,
            "No birthdays have been registered in this server yet.",
        )
        .await;
    }

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(birthdays_embed(&birthdays)),
        )
        .await
        .map_err(CommandError::Discord)?;

    Ok(())
}

fn birthdays_embed(birthdays: &[BirthdayRecord]) -> CreateEmbed {
    let mut by_month: [Vec<String>; 12] = Default::default();
    for birthday in birthdays {
        let year_text = birthday
            .year
            .map(|year| format!(" ({year})"))
            .unwrap_or_default();
        by_month[(birthday.month - 1) as usize].push(format!(
            "<@{}>: {}{}",
            birthday.user_id, birthday.day, year_text
        ));
    }

    let mut embed = CreateEmbed::new()
        .title("🎂 Registered Birthdays 🎂")
        .colour(0xFF69B4)
        .description("Here are all the registered birthdays in this server:")
        .timestamp(Timestamp::now());

    for (name, entries) in MONTHS.iter().zip(&by_month) {
        if !entries.is_empty() {
            embed = embed.field(*name, entries.join("\n"), true);
        }
    }

    embed
}
