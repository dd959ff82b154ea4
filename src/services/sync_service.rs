//! Per-mailbox sync state machine: full and incremental imports, token
//! refresh, retry backoff, stale-cursor recovery.
//!
//! The engine holds a single in-flight guard: at most one mailbox syncs at
//! a time, and timer firings that land while a sync is running skip
//! instead of queueing.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::db::{mailboxes, messages};
use crate::error::{Error, Result};
use crate::gmail::{ListParams, MailProvider};
use crate::models::message::{
    apply_label_delta, is_read_from_labels, is_starred_from_labels, INBOX_LABEL,
};
use crate::models::{Mailbox, SyncStatus};
use crate::secretbox::SecretBox;

pub const DEFAULT_FULL_SYNC_LIMIT: i64 = 200;
const PAGE_SIZE: i64 = 50;

const BACKOFF_SECONDS: [i64; 3] = [60, 300, 900];
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Mailboxes stuck in `syncing` longer than this are forced back to
/// `synced` before the next attempt.
const WATCHDOG_THRESHOLD_MINUTES: i64 = 5;

/// Background token refresh kicks in inside this horizon.
const REFRESH_HORIZON_MINUTES: i64 = 10;
/// On-demand callers refresh closer to the edge.
const ON_DEMAND_HORIZON_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy)]
struct RetryEntry {
    attempts: u32,
    next_attempt_at: DateTime<Utc>,
}

pub struct SyncEngine {
    pool: SqlitePool,
    provider: Arc<dyn MailProvider>,
    secrets: SecretBox,
    is_syncing: AtomicBool,
    retries: Mutex<HashMap<i64, RetryEntry>>,
}

/// RAII release for the single-flight guard.
struct SyncPermit<'a> {
    engine: &'a SyncEngine,
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        self.engine.is_syncing.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    pub fn new(pool: SqlitePool, provider: Arc<dyn MailProvider>, secrets: SecretBox) -> Self {
        Self {
            pool,
            provider,
            secrets,
            is_syncing: AtomicBool::new(false),
            retries: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider(&self) -> &dyn MailProvider {
        self.provider.as_ref()
    }

    fn try_begin(&self) -> Option<SyncPermit<'_>> {
        self.is_syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SyncPermit { engine: self })
    }

    /// Bounded scan of inbox-labeled messages from scratch; used on first
    /// connect and after stale-cursor recovery.
    pub async fn full_sync(&self, mailbox_id: i64, max_messages: i64) -> Result<()> {
        let Some(_permit) = self.try_begin() else {
            debug!(mailbox_id, "sync already in flight, skipping full sync");
            return Ok(());
        };
        let result = self.run_full(mailbox_id, max_messages).await;
        drop(_permit);
        self.settle(mailbox_id, result).await
    }

    pub async fn incremental_sync(&self, mailbox_id: i64) -> Result<()> {
        let mailbox = match mailboxes::find(&self.pool, mailbox_id).await? {
            Some(m) if m.is_active => m,
            _ => return Ok(()),
        };
        if mailbox.history_id.is_none() {
            return self.full_sync(mailbox_id, DEFAULT_FULL_SYNC_LIMIT).await;
        }

        let Some(_permit) = self.try_begin() else {
            debug!(mailbox_id, "sync already in flight, skipping incremental sync");
            return Ok(());
        };
        let result = self.run_incremental(&mailbox).await;
        drop(_permit);
        self.settle(mailbox_id, result).await
    }

    pub async fn sync_on_demand(&self, mailbox_id: i64, force_full: bool) -> Result<()> {
        let mailbox = mailboxes::find(&self.pool, mailbox_id)
            .await?
            .ok_or(Error::NotFound("mailbox"))?;
        if force_full || mailbox.history_id.is_none() {
            self.full_sync(mailbox_id, DEFAULT_FULL_SYNC_LIMIT).await
        } else {
            self.incremental_sync(mailbox_id).await
        }
    }

    /// Outcome handling shared by both entry points: success clears the
    /// retry entry, a stale cursor restarts from scratch, transient
    /// failures back off, fatal failures stop the chain.
    async fn settle(&self, mailbox_id: i64, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.retries.lock().unwrap().remove(&mailbox_id);
                Ok(())
            }
            Err(Error::StaleCursor) => {
                info!(mailbox_id, "history cursor rejected, falling back to full sync");
                mailboxes::clear_history_id(&self.pool, mailbox_id).await?;
                self.retries.lock().unwrap().remove(&mailbox_id);
                Box::pin(self.full_sync(mailbox_id, DEFAULT_FULL_SYNC_LIMIT)).await
            }
            Err(err) if err.is_transient() => {
                let message = err.to_string();
                let exhausted = self.schedule_retry(mailbox_id);
                if exhausted {
                    warn!(mailbox_id, error = %message, "sync retries exhausted");
                    mailboxes::mark_error(
                        &self.pool,
                        mailbox_id,
                        &format!("{message} (max retries exceeded)"),
                    )
                    .await?;
                } else {
                    warn!(mailbox_id, error = %message, "sync failed, retry scheduled");
                    mailboxes::mark_error(&self.pool, mailbox_id, &message).await?;
                }
                Ok(())
            }
            Err(err) => {
                warn!(mailbox_id, error = %err, "sync failed terminally");
                mailboxes::mark_error(&self.pool, mailbox_id, &err.to_string()).await?;
                self.retries.lock().unwrap().remove(&mailbox_id);
                Ok(())
            }
        }
    }

    /// Returns true when the attempt budget is spent and the entry was
    /// dropped.
    fn schedule_retry(&self, mailbox_id: i64) -> bool {
        let mut retries = self.retries.lock().unwrap();
        let entry = retries.entry(mailbox_id).or_insert(RetryEntry {
            attempts: 0,
            next_attempt_at: Utc::now(),
        });
        entry.attempts += 1;
        if entry.attempts > MAX_RETRY_ATTEMPTS {
            retries.remove(&mailbox_id);
            return true;
        }
        let idx = (entry.attempts as usize - 1).min(BACKOFF_SECONDS.len() - 1);
        entry.next_attempt_at = Utc::now() + Duration::seconds(BACKOFF_SECONDS[idx]);
        false
    }

    async fn run_full(&self, mailbox_id: i64, max_messages: i64) -> Result<()> {
        let mailbox = mailboxes::find(&self.pool, mailbox_id)
            .await?
            .ok_or(Error::NotFound("mailbox"))?;
        mailboxes::set_sync_status(&self.pool, mailbox_id, SyncStatus::Syncing).await?;

        let token = self
            .access_token(&mailbox, Duration::minutes(ON_DEMAND_HORIZON_MINUTES))
            .await?;

        // The cursor is captured before the scan so nothing observed during
        // the scan is skipped by the next incremental pass.
        let profile = self.provider.get_profile(&token).await?;

        let mut imported = 0i64;
        let mut page_token: Option<String> = None;
        loop {
            let remaining = max_messages - imported;
            if remaining <= 0 {
                break;
            }
            let page = self
                .provider
                .list_messages(
                    &token,
                    &ListParams {
                        max_results: remaining.min(PAGE_SIZE),
                        page_token: page_token.clone(),
                        query: None,
                        label_ids: vec![INBOX_LABEL.to_string()],
                    },
                )
                .await?;

            let hydrated = self.provider.get_messages(&token, &page.ids).await;
            for msg in &hydrated {
                if let Err(e) = messages::upsert_parsed(&self.pool, mailbox_id, msg).await {
                    warn!(mailbox_id, gmail_message_id = %msg.gmail_message_id, error = %e, "upsert failed");
                }
            }
            imported += page.ids.len() as i64;

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        mailboxes::mark_synced(&self.pool, mailbox_id, Some(&profile.history_id)).await?;
        mailboxes::recompute_counters(&self.pool, mailbox_id).await?;
        info!(mailbox_id, imported, "full sync completed");
        Ok(())
    }

    async fn run_incremental(&self, mailbox: &Mailbox) -> Result<()> {
        let mailbox_id = mailbox.id;
        let cursor = mailbox
            .history_id
            .as_deref()
            .ok_or_else(|| Error::validation("incremental sync requires a history cursor"))?;
        mailboxes::set_sync_status(&self.pool, mailbox_id, SyncStatus::Syncing).await?;

        let token = self
            .access_token(mailbox, Duration::minutes(ON_DEMAND_HORIZON_MINUTES))
            .await?;
        let diff = self.provider.get_history_changes(&token, cursor).await?;

        // Apply in history order: added, deleted, then label changes.
        let added = dedupe(&diff.messages_added);
        if !added.is_empty() {
            let hydrated = self.provider.get_messages(&token, &added).await;
            for msg in &hydrated {
                if let Err(e) = messages::upsert_parsed(&self.pool, mailbox_id, msg).await {
                    warn!(mailbox_id, gmail_message_id = %msg.gmail_message_id, error = %e, "upsert failed");
                }
            }
        }

        let deleted = dedupe(&diff.messages_deleted);
        if !deleted.is_empty() {
            messages::soft_delete_by_gmail_ids(&self.pool, mailbox_id, &deleted).await?;
        }

        for delta in &diff.labels_modified {
            let Some(mut email) =
                messages::find_by_gmail_id(&self.pool, mailbox_id, &delta.gmail_message_id).await?
            else {
                continue;
            };
            email.labels =
                apply_label_delta(&email.labels, &delta.labels_added, &delta.labels_removed);
            email.is_read = is_read_from_labels(&email.labels);
            email.is_starred = is_starred_from_labels(&email.labels);
            messages::save_user_fields(&self.pool, &email).await?;
        }

        mailboxes::mark_synced(&self.pool, mailbox_id, diff.cursor.as_deref()).await?;
        mailboxes::recompute_counters(&self.pool, mailbox_id).await?;
        info!(
            mailbox_id,
            added = added.len(),
            deleted = deleted.len(),
            label_changes = diff.labels_modified.len(),
            "incremental sync completed"
        );
        Ok(())
    }

    /// Decrypts the mailbox's access token, refreshing it first when it
    /// expires inside the horizon. The refreshed token is re-encrypted and
    /// persisted before use.
    pub async fn access_token(&self, mailbox: &Mailbox, horizon: Duration) -> Result<String> {
        let expiring = match mailbox.token_expires_at {
            Some(at) => at <= Utc::now() + horizon,
            None => true,
        };
        if !expiring {
            return self.secrets.decrypt(&mailbox.access_token_enc);
        }

        let refresh_token = self.secrets.decrypt(&mailbox.refresh_token_enc)?;
        let refreshed = self.provider.refresh_tokens(&refresh_token).await?;
        let sealed = self.secrets.encrypt(&refreshed.access_token)?;
        mailboxes::update_access_token(&self.pool, mailbox.id, &sealed, refreshed.expires_at)
            .await?;
        Ok(refreshed.access_token)
    }

    /// Token-refresh tick: every active mailbox with a token expiring
    /// inside the near-expiry horizon gets a fresh one.
    pub async fn refresh_expiring_tokens(&self) {
        let expiring = match mailboxes::list_expiring_tokens(
            &self.pool,
            Duration::minutes(REFRESH_HORIZON_MINUTES),
        )
        .await
        {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "token refresh scan failed");
                return;
            }
        };

        for mailbox in expiring {
            let refreshed = async {
                let refresh_token = self.secrets.decrypt(&mailbox.refresh_token_enc)?;
                let fresh = self.provider.refresh_tokens(&refresh_token).await?;
                let sealed = self.secrets.encrypt(&fresh.access_token)?;
                mailboxes::update_access_token(&self.pool, mailbox.id, &sealed, fresh.expires_at)
                    .await
            }
            .await;

            if let Err(e) = refreshed {
                warn!(mailbox_id = mailbox.id, error = %e, "token refresh failed");
                let _ = mailboxes::mark_error(
                    &self.pool,
                    mailbox.id,
                    &format!("token refresh failed: {e}"),
                )
                .await;
            }
        }
    }

    /// Incremental tick: reset watchdogged mailboxes, then walk every
    /// active mailbox that is not currently syncing.
    pub async fn incremental_tick(&self) {
        match mailboxes::reset_stuck_syncing(
            &self.pool,
            Duration::minutes(WATCHDOG_THRESHOLD_MINUTES),
        )
        .await
        {
            Ok(0) => {}
            Ok(n) => warn!(count = n, "watchdog reset stuck mailboxes"),
            Err(e) => warn!(error = %e, "watchdog scan failed"),
        }

        let mailboxes = match mailboxes::list_active(&self.pool).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "mailbox scan failed");
                return;
            }
        };
        for mailbox in mailboxes {
            if mailbox.sync_status == SyncStatus::Syncing {
                continue;
            }
            if let Err(e) = self.incremental_sync(mailbox.id).await {
                warn!(mailbox_id = mailbox.id, error = %e, "scheduled sync failed");
            }
        }
    }

    /// Retry tick: re-run incremental sync for entries whose scheduled
    /// time has passed.
    pub async fn run_due_retries(&self) {
        let now = Utc::now();
        let due: Vec<i64> = {
            let retries = self.retries.lock().unwrap();
            retries
                .iter()
                .filter(|(_, entry)| entry.next_attempt_at <= now)
                .map(|(id, _)| *id)
                .collect()
        };
        for mailbox_id in due {
            debug!(mailbox_id, "retrying sync");
            if let Err(e) = self.incremental_sync(mailbox_id).await {
                warn!(mailbox_id, error = %e, "sync retry failed");
            }
        }
    }

    /// Retry entries are in-memory only; dropped on shutdown and
    /// rediscovered on startup from mailbox status.
    pub fn pending_retries(&self) -> usize {
        self.retries.lock().unwrap().len()
    }
}

fn dedupe(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}
