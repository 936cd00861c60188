//! The periodic birthday scan and the synchronous single-user check.
//!
//! Both entry points share one in-memory ledger, so a user is announced at
//! most once per UTC day no matter which path fires first. Failed sends are
//! not retried here; the next scan tick retries naturally because the key
//! is retracted from the ledger.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use serenity::all::{Channel, ChannelId, ChannelType, Http};
use serenity::async_trait;
use tracing::{error, info, warn};

use crate::dates::local_date;
use crate::ledger::{LedgerKey, SharedLedger};
use crate::store::{BirthdayRecord, BirthdayStore};

/// Delivery of announcement messages to a destination channel.
#[async_trait]
pub trait AnnouncementSink: Send + Sync {
    /// Checks that the destination exists and can take messages. Called
    /// once per guild per scan tick, before any per-user work.
    async fn resolve_destination(&self, channel: ChannelId) -> Result<()>;

    async fn send(&self, channel: ChannelId, text: &str) -> Result<()>;
}

/// Sink backed by the Discord HTTP API.
pub struct DiscordSink {
    http: Arc<Http>,
}

impl DiscordSink {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl AnnouncementSink for DiscordSink {
    async fn resolve_destination(&self, channel: ChannelId) -> Result<()> {
        let channel = self
            .http
            .get_channel(channel)
            .await
            .context("Failed to fetch announcement channel")?;

        match channel {
            Channel::Guild(channel)
                if matches!(channel.kind, ChannelType::Text | ChannelType::News) =>
            {
                Ok(())
            }
            _ => bail!("announcement channel is not a guild text channel"),
        }
    }

    async fn send(&self, channel: ChannelId, text: &str) -> Result<()> {
        channel
            .say(self.http.as_ref(), text)
            .await
            .context("Failed to send announcement")?;
        Ok(())
    }
}

pub struct BirthdayScanner<S, K> {
    store: S,
    sink: K,
    ledger: SharedLedger,
}

impl<S: BirthdayStore, K: AnnouncementSink> BirthdayScanner<S, K> {
    pub fn new(store: S, sink: K, ledger: SharedLedger) -> Self {
        Self {
            store,
            sink,
            ledger,
        }
    }

    /// One scan tick: walk every set-up guild and announce matching
    /// birthdays. A failure local to one guild or one user is logged and
    /// the scan moves on.
    pub async fn run_scan(&self, now: DateTime<Utc>) {
        self.ledger
            .lock()
            .expect("ledger mutex poisoned")
            .reset_if_new_day(now);

        let guilds = match self.store.list_guilds().await {
            Ok(guilds) => guilds,
            Err(e) => {
                error!(error = %e, "Failed to list guilds, skipping this scan tick");
                return;
            }
        };

        for guild in guilds {
            let Some(channel) = guild.announcement_channel else {
                continue;
            };
            let channel = ChannelId::new(channel);

            let birthdays = match self.store.list_birthdays(guild.guild_id).await {
                Ok(birthdays) => birthdays,
                Err(e) => {
                    warn!(guild_id = guild.guild_id, error = %e, "Failed to list birthdays");
                    continue;
                }
            };

            // Nothing to announce, no reason to touch the destination.
            if birthdays.is_empty() {
                continue;
            }

            if let Err(e) = self.sink.resolve_destination(channel).await {
                warn!(
                    guild_id = guild.guild_id,
                    channel_id = channel.get(),
                    error = %e,
                    "Announcement channel unavailable, skipping guild"
                );
                continue;
            }

            for record in &birthdays {
                self.check_record(channel, record, now).await;
            }
        }
    }

    /// Checks a single user right after a set/edit command. Returns whether
    /// an announcement was sent, so the caller can tell the user.
    pub async fn check_one(
        &self,
        guild_id: u64,
        user_id: u64,
        channel: ChannelId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(record) = self.store.get_birthday(guild_id, user_id).await? else {
            return Ok(false);
        };

        if let Err(e) = self.sink.resolve_destination(channel).await {
            warn!(
                guild_id,
                channel_id = channel.get(),
                error = %e,
                "Announcement channel unavailable"
            );
            return Ok(false);
        }

        Ok(self.check_record(channel, &record, now).await)
    }

    /// The per-user step shared by both entry points. Claims the ledger key
    /// under one lock acquisition before the send; a failed send retracts
    /// the claim so a later tick retries.
    async fn check_record(
        &self,
        channel: ChannelId,
        record: &BirthdayRecord,
        now: DateTime<Utc>,
    ) -> bool {
        let local = local_date(&record.timezone, now);
        if local.day != record.day || local.month != record.month {
            return false;
        }

        let key = LedgerKey {
            guild_id: record.guild_id,
            user_id: record.user_id,
            day: local.day,
            month: local.month,
        };

        {
            let mut ledger = self.ledger.lock().expect("ledger mutex poisoned");
            if ledger.has_announced(&key) {
                return false;
            }
            ledger.mark_announced(key.clone());
        }

        let text = announcement_text(record, local.year);
        if let Err(e) = self.sink.send(channel, &text).await {
            warn!(
                guild_id = record.guild_id,
                user_id = record.user_id,
                channel_id = channel.get(),
                error = %e,
                "Failed to send birthday announcement"
            );
            self.ledger
                .lock()
                .expect("ledger mutex poisoned")
                .retract(&key);
            return false;
        }

        info!(
            guild_id = record.guild_id,
            user_id = record.user_id,
            "Announced birthday"
        );
        true
    }
}

fn announcement_text(record: &BirthdayRecord, local_year: i32) -> String {
    let age_text = record
        .year
        .map(|year| format!(" They are turning {} today!", local_year - year))
        .unwrap_or_default();
    format!("🎉 Happy Birthday to <@{}>!{} 🎂", record.user_id, age_text)
}

/// Drives the scanner on a fixed cadence forever. Spawned once the Discord
/// connection is ready.
pub async fn run_scan_loop<S, K>(scanner: BirthdayScanner<S, K>, interval: Duration)
where
    S: BirthdayStore,
    K: AnnouncementSink,
{
    info!(
        interval = %humantime::format_duration(interval),
        "Starting birthday scan loop"
    );

    loop {
        info!("Running birthday scan");
        scanner.run_scan(Utc::now()).await;
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use anyhow::anyhow;
    use chrono::Utc;

    use crate::ledger::AnnouncementLedger;
    use crate::store::GuildConfig;

    #[derive(Default)]
    struct MemStore {
        guilds: Vec<GuildConfig>,
        birthdays: HashMap<u64, Vec<BirthdayRecord>>,
        failing_guilds: HashSet<u64>,
    }

    #[async_trait]
    impl BirthdayStore for MemStore {
        async fn list_guilds(&self) -> Result<Vec<GuildConfig>> {
            Ok(self.guilds.clone())
        }

        async fn list_birthdays(&self, guild_id: u64) -> Result<Vec<BirthdayRecord>> {
            if self.failing_guilds.contains(&guild_id) {
                return Err(anyhow!("store unavailable"));
            }
            Ok(self.birthdays.get(&guild_id).cloned().unwrap_or_default())
        }

        async fn get_birthday(
            &self,
            guild_id: u64,
            user_id: u64,
        ) -> Result<Option<BirthdayRecord>> {
            if self.failing_guilds.contains(&guild_id) {
                return Err(anyhow!("store unavailable"));
            }
            Ok(self
                .birthdays
                .get(&guild_id)
                .and_then(|records| records.iter().find(|r| r.user_id == user_id).cloned()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(u64, String)>>,
        resolves: Mutex<Vec<u64>>,
        unresolvable: HashSet<u64>,
        failing: bool,
    }

    #[async_trait]
    impl AnnouncementSink for Arc<RecordingSink> {
        async fn resolve_destination(&self, channel: ChannelId) -> Result<()> {
            self.resolves.lock().unwrap().push(channel.get());
            if self.unresolvable.contains(&channel.get()) {
                return Err(anyhow!("channel deleted"));
            }
            Ok(())
        }

        async fn send(&self, channel: ChannelId, text: &str) -> Result<()> {
            if self.failing {
                return Err(anyhow!("missing permissions"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((channel.get(), text.to_string()));
            Ok(())
        }
    }

    fn record(guild_id: u64, user_id: u64, day: u32, month: u32, timezone: &str) -> BirthdayRecord {
        BirthdayRecord {
            guild_id,
            user_id,
            username: "alice".to_string(),
            day,
            month,
            year: None,
            timezone: timezone.to_string(),
            created_at: Utc::now(),
        }
    }

    fn guild(guild_id: u64, channel: u64) -> GuildConfig {
        GuildConfig {
            guild_id,
            announcement_channel: Some(channel),
        }
    }

    fn ledger_at(s: &str) -> SharedLedger {
        Arc::new(Mutex::new(AnnouncementLedger::new(s.parse().unwrap())))
    }

    fn instant(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn announces_once_per_day() {
        // Scenario A: a UTC user is announced on the first matching scan
        // and suppressed on the next one the same day.
        let store = MemStore {
            guilds: vec![guild(1, 100)],
            birthdays: HashMap::from([(1, vec![record(1, 10, 15, 6, "UTC")])]),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let scanner = BirthdayScanner::new(store, sink.clone(), ledger_at("2024-06-15T00:00:00Z"));

        scanner.run_scan(instant("2024-06-15T10:00:00Z")).await;
        scanner.run_scan(instant("2024-06-15T14:00:00Z")).await;

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 100);
        assert_eq!(sent[0].1, "🎉 Happy Birthday to <@10>! 🎂");
    }

    #[tokio::test]
    async fn announcement_includes_age_when_year_is_known() {
        let mut rec = record(1, 10, 15, 6, "UTC");
        rec.year = Some(1990);
        let store = MemStore {
            guilds: vec![guild(1, 100)],
            birthdays: HashMap::from([(1, vec![rec])]),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let scanner = BirthdayScanner::new(store, sink.clone(), ledger_at("2024-06-15T00:00:00Z"));

        scanner.run_scan(instant("2024-06-15T10:00:00Z")).await;

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent[0].1, "🎉 Happy Birthday to <@10>! They are turning 34 today! 🎂");
    }

    #[tokio::test]
    async fn matches_in_the_users_timezone() {
        // Scenario B: June 15 in Los Angeles starts at 07:00 UTC.
        let store = MemStore {
            guilds: vec![guild(1, 100)],
            birthdays: HashMap::from([(1, vec![record(1, 10, 15, 6, "America/Los_Angeles")])]),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let scanner = BirthdayScanner::new(store, sink.clone(), ledger_at("2024-06-15T00:00:00Z"));

        scanner.run_scan(instant("2024-06-15T04:00:00Z")).await;
        assert!(sink.sent.lock().unwrap().is_empty());

        scanner.run_scan(instant("2024-06-15T08:00:00Z")).await;
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_timezone_falls_back_to_utc() {
        // Scenario C.
        let store = MemStore {
            guilds: vec![guild(1, 100)],
            birthdays: HashMap::from([(1, vec![record(1, 10, 15, 6, "Not/AZone")])]),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let scanner = BirthdayScanner::new(store, sink.clone(), ledger_at("2024-06-15T00:00:00Z"));

        scanner.run_scan(instant("2024-06-15T10:00:00Z")).await;
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ledger_resets_after_utc_midnight() {
        // Scenario D: the first tick after UTC midnight clears the ledger,
        // making the next day's birthdays announceable.
        let store = MemStore {
            guilds: vec![guild(1, 100)],
            birthdays: HashMap::from([(
                1,
                vec![record(1, 10, 15, 6, "UTC"), record(1, 11, 16, 6, "UTC")],
            )]),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let scanner = BirthdayScanner::new(store, sink.clone(), ledger_at("2024-06-15T00:00:00Z"));

        scanner.run_scan(instant("2024-06-15T23:00:00Z")).await;
        scanner.run_scan(instant("2024-06-16T00:03:00Z")).await;
        scanner.run_scan(instant("2024-06-16T01:00:00Z")).await;

        let sent = sink.sent.lock().unwrap();
        let announced: Vec<&str> = sent.iter().map(|(_, text)| text.as_str()).collect();
        assert_eq!(
            announced,
            vec![
                "🎉 Happy Birthday to <@10>! 🎂",
                "🎉 Happy Birthday to <@11>! 🎂",
            ]
        );
    }

    #[tokio::test]
    async fn one_failing_guild_does_not_abort_the_scan() {
        // Scenario E: isolation across guilds.
        let store = MemStore {
            guilds: vec![guild(1, 100), guild(2, 200)],
            birthdays: HashMap::from([
                (1, vec![record(1, 10, 15, 6, "UTC")]),
                (2, vec![record(2, 20, 15, 6, "UTC")]),
            ]),
            failing_guilds: HashSet::from([1]),
        };
        let sink = Arc::new(RecordingSink::default());
        let scanner = BirthdayScanner::new(store, sink.clone(), ledger_at("2024-06-15T00:00:00Z"));

        scanner.run_scan(instant("2024-06-15T10:00:00Z")).await;

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 200);
    }

    #[tokio::test]
    async fn unresolvable_channel_skips_the_guild() {
        let store = MemStore {
            guilds: vec![guild(1, 100), guild(2, 200)],
            birthdays: HashMap::from([
                (1, vec![record(1, 10, 15, 6, "UTC")]),
                (2, vec![record(2, 20, 15, 6, "UTC")]),
            ]),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink {
            unresolvable: HashSet::from([100]),
            ..Default::default()
        });
        let scanner = BirthdayScanner::new(store, sink.clone(), ledger_at("2024-06-15T00:00:00Z"));

        scanner.run_scan(instant("2024-06-15T10:00:00Z")).await;

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 200);
    }

    #[tokio::test]
    async fn empty_guild_never_resolves_the_destination() {
        let store = MemStore {
            guilds: vec![guild(1, 100)],
            birthdays: HashMap::new(),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let scanner = BirthdayScanner::new(store, sink.clone(), ledger_at("2024-06-15T00:00:00Z"));

        scanner.run_scan(instant("2024-06-15T10:00:00Z")).await;

        assert!(sink.resolves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn guild_without_channel_is_skipped() {
        let store = MemStore {
            guilds: vec![GuildConfig {
                guild_id: 1,
                announcement_channel: None,
            }],
            birthdays: HashMap::from([(1, vec![record(1, 10, 15, 6, "UTC")])]),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let scanner = BirthdayScanner::new(store, sink.clone(), ledger_at("2024-06-15T00:00:00Z"));

        scanner.run_scan(instant("2024-06-15T10:00:00Z")).await;

        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn check_one_and_scan_share_the_ledger() {
        let store = MemStore {
            guilds: vec![guild(1, 100)],
            birthdays: HashMap::from([(1, vec![record(1, 10, 15, 6, "UTC")])]),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let scanner = BirthdayScanner::new(store, sink.clone(), ledger_at("2024-06-15T00:00:00Z"));
        let now = instant("2024-06-15T10:00:00Z");

        let announced = scanner
            .check_one(1, 10, ChannelId::new(100), now)
            .await
            .unwrap();
        assert!(announced);

        // The bulk scan must not announce the same user again.
        scanner.run_scan(now).await;
        assert_eq!(sink.sent.lock().unwrap().len(), 1);

        // Nor a repeated synchronous check.
        let announced = scanner
            .check_one(1, 10, ChannelId::new(100), now)
            .await
            .unwrap();
        assert!(!announced);
    }

    #[tokio::test]
    async fn check_one_without_a_record_reports_nothing_sent() {
        let store = MemStore {
            guilds: vec![guild(1, 100)],
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let scanner = BirthdayScanner::new(store, sink.clone(), ledger_at("2024-06-15T00:00:00Z"));

        let announced = scanner
            .check_one(1, 99, ChannelId::new(100), instant("2024-06-15T10:00:00Z"))
            .await
            .unwrap();
        assert!(!announced);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_send_is_retried_on_a_later_tick() {
        let store = MemStore {
            guilds: vec![guild(1, 100)],
            birthdays: HashMap::from([(1, vec![record(1, 10, 15, 6, "UTC")])]),
            ..Default::default()
        };
        let ledger = ledger_at("2024-06-15T00:00:00Z");

        let failing = Arc::new(RecordingSink {
            failing: true,
            ..Default::default()
        });
        let store2 = MemStore {
            guilds: vec![guild(1, 100)],
            birthdays: HashMap::from([(1, vec![record(1, 10, 15, 6, "UTC")])]),
            ..Default::default()
        };

        let scanner = BirthdayScanner::new(store, failing.clone(), ledger.clone());
        scanner.run_scan(instant("2024-06-15T10:00:00Z")).await;
        assert!(failing.sent.lock().unwrap().is_empty());

        // The failed claim was retracted, so the next tick announces.
        let working = Arc::new(RecordingSink::default());
        let scanner = BirthdayScanner::new(store2, working.clone(), ledger);
        scanner.run_scan(instant("2024-06-15T11:00:00Z")).await;
        assert_eq!(working.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn age_is_computed_from_the_local_year() {
        let mut rec = record(1, 10, 1, 1, "Pacific/Auckland");
        rec.year = Some(2000);
        // New Year's day local year 2025 while UTC is still 2024.
        assert_eq!(
            announcement_text(&rec, 2025),
            "🎉 Happy Birthday to <@10>! They are turning 25 today! 🎂"
        );
    }
}
