//! Zodiac sign roles assigned from a registered birth date.

use std::collections::HashMap;

use anyhow::{Context as _, Result};
use serenity::all::{Colour, EditRole, GuildId, Http, RoleId, UserId};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Aries,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Capricorn,
    Aquarius,
    Pisces,
}

impl Sign {
    pub const ALL: [Sign; 12] = [
        Sign::Aries,
        Sign::Taurus,
        Sign::Gemini,
        Sign::Cancer,
        Sign::Leo,
        Sign::Virgo,
        Sign::Libra,
        Sign::Scorpio,
        Sign::Sagittarius,
        Sign::Capricorn,
        Sign::Aquarius,
        Sign::Pisces,
    ];

    /// The sign whose date range contains (day, month). `None` only for
    /// day/month pairs that are not real dates.
    pub fn from_date(day: u32, month: u32) -> Option<Sign> {
        let sign = match (month, day) {
            (3, 21..) | (4, ..=19) => Sign::Aries,
            (4, 20..) | (5, ..=20) => Sign::Taurus,
            (5, 21..) | (6, ..=20) => Sign::Gemini,
            (6, 21..) | (7, ..=22) => Sign::Cancer,
            (7, 23..) | (8, ..=22) => Sign::Leo,
            (8, 23..) | (9, ..=22) => Sign::Virgo,
            (9, 23..) | (10, ..=22) => Sign::Libra,
            (10, 23..) | (11, ..=21) => Sign::Scorpio,
            (11, 22..) | (12, ..=21) => Sign::Sagittarius,
            (12, 22..) | (1, ..=19) => Sign::Capricorn,
            (1, 20..) | (2, ..=18) => Sign::Aquarius,
            (2, 19..) | (3, ..=20) => Sign::Pisces,
            _ => return None,
        };
        Some(sign)
    }

    pub fn name(self) -> &'static str {
        match self {
            Sign::Aries => "Aries",
            Sign::Taurus => "Taurus",
            Sign::Gemini => "Gemini",
            Sign::Cancer => "Cancer",
            Sign::Leo => "Leo",
            Sign::Virgo => "Virgo",
            Sign::Libra => "Libra",
            Sign::Scorpio => "Scorpio",
            Sign::Sagittarius => "Sagittarius",
            Sign::Capricorn => "Capricorn",
            Sign::Aquarius => "Aquarius",
            Sign::Pisces => "Pisces",
        }
    }

    pub fn colour(self) -> Colour {
        let rgb: u32 = match self {
            Sign::Aries => 0xFF0000,
            Sign::Taurus => 0x00FF00,
            Sign::Gemini => 0xFFFF00,
            Sign::Cancer => 0xFFFFFF,
            Sign::Leo => 0xFFA500,
            Sign::Virgo => 0x964B00,
            Sign::Libra => 0xFFC0CB,
            Sign::Scorpio => 0x800000,
            Sign::Sagittarius => 0x800080,
            Sign::Capricorn => 0x000000,
            Sign::Aquarius => 0x0000FF,
            Sign::Pisces => 0x40E0D0,
        };
        Colour::new(rgb)
    }

    fn is_sign_role(name: &str) -> bool {
        Sign::ALL.iter().any(|sign| sign.name() == name)
    }
}

/// Creates any missing sign role just above `@everyone` and returns the
/// role id of every sign.
async fn ensure_roles(http: &Http, guild_id: GuildId) -> Result<HashMap<&'static str, RoleId>> {
    let existing = guild_id
        .roles(http)
        .await
        .context("Failed to fetch guild roles")?;

    let mut ids = HashMap::new();
    for sign in Sign::ALL {
        if let Some(role) = existing.values().find(|role| role.name == sign.name()) {
            ids.insert(sign.name(), role.id);
        } else {
            let role = guild_id
                .create_role(
                    http,
                    EditRole::new()
                        .name(sign.name())
                        .colour(sign.colour())
                        .position(1),
                )
                .await
                .with_context(|| format!("Failed to create {} role", sign.name()))?;
            info!(guild_id = guild_id.get(), sign = sign.name(), "Created zodiac role");
            ids.insert(sign.name(), role.id);
        }
    }
    Ok(ids)
}

/// Gives the member the sign role matching their birth date and removes
/// any other sign role they carry.
pub async fn assign_role(
    http: &Http,
    guild_id: GuildId,
    user_id: UserId,
    day: u32,
    month: u32,
) -> Result<Sign> {
    let sign = Sign::from_date(day, month).context("No zodiac sign for this date")?;

    let ids = ensure_roles(http, guild_id).await?;
    let target = ids[sign.name()];

    let all_roles = guild_id
        .roles(http)
        .await
        .context("Failed to fetch guild roles")?;
    let member = guild_id
        .member(http, user_id)
        .await
        .context("Failed to fetch member")?;

    for role_id in &member.roles {
        if *role_id == target {
            continue;
        }
        if let Some(role) = all_roles.get(role_id)
            && Sign::is_sign_role(&role.name)
        {
            member
                .remove_role(http, *role_id)
                .await
                .context("Failed to remove old zodiac role")?;
        }
    }

    if !member.roles.contains(&target) {
        member
            .add_role(http, target)
            .await
            .context("Failed to add zodiac role")?;
    }

    Ok(sign)
}

/// Strips every sign role from the member. Returns whether any role was
/// removed.
pub async fn remove_roles(http: &Http, guild_id: GuildId, user_id: UserId) -> Result<bool> {
    let all_roles = guild_id
        .roles(http)
        .await
        .context("Failed to fetch guild roles")?;
    let member = guild_id
        .member(http, user_id)
        .await
        .context("Failed to fetch member")?;

    let mut removed = false;
    for role_id in &member.roles {
        if let Some(role) = all_roles.get(role_id)
            && Sign::is_sign_role(&role.name)
        {
            member
                .remove_role(http, *role_id)
                .await
                .context("Failed to remove zodiac role")?;
            removed = true;
        }
    }

    Ok(removed)
}
