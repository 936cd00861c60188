use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context as _, Result};
use chrono::{Datelike, Utc};
use serenity::all::{
    CommandInteraction, CommandOptionType, CreateAutocompleteResponse, CreateCommand,
    CreateCommandOption, CreateInteractionResponse, EditInteractionResponse, GatewayIntents,
    Permissions,
};
use serenity::async_trait;
use serenity::client::Context as SerenityContext;
use serenity::prelude::*;
use tracing::{error, info};

use crate::commands;
use crate::config::Config;
use crate::error::CommandError;
use crate::ledger::SharedLedger;
use crate::scheduler::{self, BirthdayScanner, DiscordSink};
use crate::store::PgStore;

/// Zone identifiers offered by the timezone autocomplete. Any valid IANA
/// identifier is accepted on input; this list is only a convenience.
const COMMON_TIMEZONES: &[&str] = &[
    // UTC
    "UTC",
    // North America
    "America/New_York",
    "America/Chicago",
    "America/Denver",
    "America/Los_Angeles",
    "America/Phoenix",
    "America/Anchorage",
    "America/Adak",
    "America/Honolulu",
    "America/Toronto",
    "America/Vancouver",
    "America/Edmonton",
    "America/Halifax",
    "America/St_Johns",
    "America/Mexico_City",
    "America/Tijuana",
    "America/Monterrey",
    // South America
    "America/Sao_Paulo",
    "America/Buenos_Aires",
    "America/Santiago",
    "America/Lima",
    "America/Bogota",
    "America/Caracas",
    "America/La_Paz",
    "America/Montevideo",
    // Europe
    "Europe/London",
    "Europe/Paris",
    "Europe/Berlin",
    "Europe/Moscow",
    "Europe/Madrid",
    "Europe/Rome",
    "Europe/Amsterdam",
    "Europe/Brussels",
    "Europe/Vienna",
    "Europe/Stockholm",
    "Europe/Oslo",
    "Europe/Copenhagen",
    "Europe/Helsinki",
    "Europe/Athens",
    "Europe/Istanbul",
    "Europe/Warsaw",
    "Europe/Bucharest",
    "Europe/Kiev",
    "Europe/Lisbon",
    "Europe/Dublin",
    // Asia
    "Asia/Tokyo",
    "Asia/Shanghai",
    "Asia/Singapore",
    "Asia/Dubai",
    "Asia/Hong_Kong",
    "Asia/Seoul",
    "Asia/Bangkok",
    "Asia/Jakarta",
    "Asia/Manila",
    "Asia/Kuala_Lumpur",
    "Asia/Taipei",
    "Asia/Kolkata",
    "Asia/Karachi",
    "Asia/Tehran",
    "Asia/Jerusalem",
    "Asia/Baghdad",
    "Asia/Riyadh",
    "Asia/Qatar",
    "Asia/Dhaka",
    "Asia/Ho_Chi_Minh",
    // Africa
    "Africa/Cairo",
    "Africa/Lagos",
    "Africa/Johannesburg",
    "Africa/Nairobi",
    "Africa/Casablanca",
    "Africa/Tunis",
    "Africa/Algiers",
    "Africa/Khartoum",
    "Africa/Accra",
    "Africa/Addis_Ababa",
    // Oceania
    "Australia/Sydney",
    "Australia/Melbourne",
    "Australia/Brisbane",
    "Australia/Perth",
    "Australia/Adelaide",
    "Australia/Darwin",
    "Australia/Hobart",
    "Pacific/Auckland",
    "Pacific/Fiji",
    "Pacific/Honolulu",
    "Pacific/Guam",
    "Pacific/Samoa",
    "Pacific/Tahiti",
    "Pacific/Noumea",
];

pub struct Handler {
    pub(crate) config: Config,
    pub(crate) store: PgStore,
    pub(crate) ledger: SharedLedger,
    scan_started: AtomicBool,
}

impl Handler {
    /// A scanner sharing this handler's store and ledger, sending through
    /// the given connection's HTTP client.
    pub(crate) fn scanner(&self, ctx: &SerenityContext) -> BirthdayScanner<PgStore, DiscordSink> {
        BirthdayScanner::new(
            self.store.clone(),
            DiscordSink::new(ctx.http.clone()),
            self.ledger.clone(),
        )
    }
}

fn birthday_date_options(command: CreateCommand) -> CreateCommand {
    command
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "day", "The day of your birthday")
                .required(true)
                .min_int_value(1)
                .max_int_value(31),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "month",
                "The month of your birthday",
            )
            .required(true)
            .min_int_value(1)
            .max_int_value(12),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "year",
                "The year of your birthday (optional)",
            )
            .required(false)
            .min_int_value(1900)
            .max_int_value(Utc::now().year() as u64),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "timezone",
                "Your timezone (e.g. America/New_York)",
            )
            .required(false)
            .set_autocomplete(true),
        )
}

fn build_commands() -> Vec<CreateCommand> {
    vec![
        birthday_date_options(CreateCommand::new("set_birthday").description("Set your birthday")),
        birthday_date_options(
            CreateCommand::new("edit_birthday").description("Edit your birthday"),
        ),
        CreateCommand::new("delete_birthday").description("Delete your birthday information"),
        CreateCommand::new("list_birthdays")
            .description("List all registered birthdays in this server"),
        CreateCommand::new("setup_birthday_boi")
            .description("Setup the birthday bot for this server")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Channel,
                    "channel",
                    "The channel where birthday announcements will be sent",
                )
                .required(true),
            ),
        CreateCommand::new("delete_setup")
            .description("Delete all server data from the database")
            .default_member_permissions(Permissions::ADMINISTRATOR),
    ]
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: SerenityContext, ready: serenity::model::gateway::Ready) {
        info!(user = %ready.user.name, "Bot connected");

        if let Err(e) =
            serenity::all::Command::set_global_commands(&ctx.http, build_commands()).await
        {
            error!(error = %e, "Failed to register commands");
        } else {
            info!("Slash commands registered");
        }

        // Reconnects fire `ready` again; only one scan loop may run.
        if !self.scan_started.swap(true, Ordering::SeqCst) {
            let scanner = self.scanner(&ctx);
            let interval = self.config.scan.interval;
            tokio::spawn(async move {
                scheduler::run_scan_loop(scanner, interval).await;
            });
        }
    }

    async fn interaction_create(
        &self,
        ctx: SerenityContext,
        interaction: serenity::model::application::Interaction,
    ) {
        match interaction {
            serenity::model::application::Interaction::Command(command) => {
                if let Err(e) = self.dispatch(&ctx, &command).await {
                    error!(error = ?e, command = %command.data.name, "Command failed");
                    self.report_error(&ctx, &command, &e).await;
                }
            }
            serenity::model::application::Interaction::Autocomplete(interaction) => {
                self.handle_autocomplete(&ctx, &interaction).await;
            }
            _ => {}
        }
    }
}

impl Handler {
    async fn dispatch(
        &self,
        ctx: &SerenityContext,
        command: &CommandInteraction,
    ) -> Result<(), CommandError> {
        match command.data.name.as_str() {
            "set_birthday" => commands::set::run(self, ctx, command).await,
            "edit_birthday" => commands::edit::run(self, ctx, command).await,
            "delete_birthday" => commands::delete::run(self, ctx, command).await,
            "list_birthdays" => commands::list::run(self, ctx, command).await,
            "setup_birthday_boi" => commands::setup::run(self, ctx, command).await,
            "delete_setup" => commands::teardown::run(self, ctx, command).await,
            _ => Ok(()),
        }
    }

    /// Replaces the deferred response with the error's user-facing message.
    async fn report_error(
        &self,
        ctx: &SerenityContext,
        command: &CommandInteraction,
        error: &CommandError,
    ) {
        let response = EditInteractionResponse::new().content(error.to_string());
        if let Err(e) = command.edit_response(&ctx.http, response).await {
            error!(error = %e, "Failed to send error response");
        }
    }

    async fn handle_autocomplete(&self, ctx: &SerenityContext, interaction: &CommandInteraction) {
        let Some(option) = interaction.data.autocomplete() else {
            return;
        };
        if option.name != "timezone" {
            return;
        }

        let input = option.value.to_lowercase();
        let mut response = CreateAutocompleteResponse::new();
        for timezone in COMMON_TIMEZONES
            .iter()
            .filter(|timezone| timezone.to_lowercase().contains(&input))
            .take(25)
        {
            response = response.add_string_choice(*timezone, *timezone);
        }

        if let Err(e) = interaction
            .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
            .await
        {
            error!(error = %e, "Failed to send autocomplete response");
        }
    }
}

pub async fn run(config: Config, store: PgStore, ledger: SharedLedger) -> Result<()> {
    let intents = GatewayIntents::GUILDS;
    let token = config.discord.token.clone();
    let handler = Handler {
        config,
        store,
        ledger,
        scan_started: AtomicBool::new(false),
    };

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await
        .context("Failed to create client")?;

    info!("Starting bot");
    client.start().await.context("Client error")?;

    Ok(())
}
