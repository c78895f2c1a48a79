//! The orchestrator: one end-to-end run.
//!
//! A run loads the tracker, ingests every configured account (fetch, plan, then render and
//! upload one item at a time), checkpoints the tracker, expires old documents, optionally
//! reconciles the tracker against the device folder, forgets removed documents whose messages can
//! no longer be fetched, and checkpoints again. Failures of single
//! items are recorded in the [`RunSummary`] and retried on the next run; only tracker I/O and
//! rejected device credentials abort a run.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span, warn};

use crate::collaborators::{DeleteOutcome, Device, MailSource, PdfDocument, Renderer};
use crate::error::{DeviceError, Error, Result};
use crate::plan::{plan_ingest, plan_purge, plan_reconciliation, plan_retention, IngestFilters};
use crate::tracker::TrackerStore;
use crate::types::{
    AccountSummary, Identity, Ledger, MessageRef, RunSummary, Stage, TrackedDocument,
};
use crate::utils::document_title;

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Location of the tracker file.
    pub tracker_path: PathBuf,
    /// How far back candidates are fetched and accepted.
    pub lookback_days: u32,
    /// Uploaded documents older than this many whole days are deleted.
    pub max_age_days: u32,
    /// Folder on the device that receives uploads.
    pub folder_name: String,
    /// Process at most this many retention deletes per run, oldest first.
    pub max_deletions_per_run: Option<usize>,
    /// Mark records removed when their document was deleted from the device by hand.
    pub reconcile: bool,
    /// Only ingest; skip retention and reconciliation.
    pub skip_cleanup: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            tracker_path: PathBuf::from("tracker.json"),
            lookback_days: 7,
            max_age_days: 30,
            folder_name: String::from("Newsletters"),
            max_deletions_per_run: None,
            reconcile: true,
            skip_cleanup: false,
        }
    }
}

/// A configured mail account: where to fetch from and whom to accept.
pub struct MailAccount {
    pub source: Box<dyn MailSource>,
    pub allowed_senders: Option<Vec<String>>,
}

impl MailAccount {
    pub fn new(source: Box<dyn MailSource>, allowed_senders: Option<Vec<String>>) -> Self {
        MailAccount {
            source,
            allowed_senders,
        }
    }
}

/// Drives runs against a fixed set of collaborators.
pub struct SyncEngine<R, D> {
    accounts: Vec<MailAccount>,
    renderer: R,
    device: D,
    settings: SyncSettings,
}

impl<R: Renderer, D: Device> SyncEngine<R, D> {
    pub fn new(accounts: Vec<MailAccount>, renderer: R, device: D, settings: SyncSettings) -> Self {
        SyncEngine {
            accounts,
            renderer,
            device,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn accounts_mut(&mut self) -> &mut [MailAccount] {
        &mut self.accounts
    }

    /// Load the tracker from [`SyncSettings::tracker_path`] and perform one run.
    ///
    /// Nothing is fetched, uploaded or deleted if the tracker cannot be loaded.
    pub fn run(&mut self, now: DateTime<Utc>) -> Result<RunSummary> {
        let mut store = TrackerStore::load(&self.settings.tracker_path)?;
        self.run_with(&mut store, now)
    }

    /// Perform one run against an already loaded tracker.
    pub fn run_with(&mut self, store: &mut TrackerStore, now: DateTime<Utc>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        // Pending records from an earlier run never got a confirmed upload: retry them.
        let mut carried_over: BTreeSet<Identity> = store
            .documents()
            .values()
            .filter(|doc| doc.is_pending())
            .map(|doc| doc.identity.clone())
            .collect();
        if !carried_over.is_empty() {
            warn!(
                count = carried_over.len(),
                "found uploads left pending by an earlier run, retrying them"
            );
        }

        let mut uploaded_now = BTreeSet::new();
        self.ingest(store, &mut carried_over, &mut uploaded_now, now, &mut summary)?;
        store.save()?;

        if self.settings.skip_cleanup {
            info!("cleanup skipped");
        } else {
            self.expire(store, now, &mut summary)?;
            if self.settings.reconcile {
                self.reconcile(store, &uploaded_now, &mut summary)?;
            }
            self.purge(store, now);
            store.save()?;
        }

        info!(
            fetched = summary.fetched(),
            ingested = summary.ingested(),
            uploaded = summary.uploaded(),
            failed = summary.failed(),
            deleted = summary.deleted,
            reconciled = summary.reconciled,
            "run complete"
        );
        Ok(summary)
    }

    fn ingest(
        &mut self,
        store: &mut TrackerStore,
        carried_over: &mut BTreeSet<Identity>,
        uploaded_now: &mut BTreeSet<Identity>,
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        for account in self.accounts.iter_mut() {
            let name = account.source.account().to_string();
            let _span = info_span!("account", account = %name).entered();
            let mut counts = AccountSummary::new(name.as_str());

            let candidates = match account.source.fetch(self.settings.lookback_days) {
                Ok(candidates) => candidates,
                Err(e) => {
                    error!(error = %e, "fetch failed, skipping account");
                    counts.fetch_error = Some(e.to_string());
                    summary.record_failure(None, Some(&name), Stage::Fetch, &e);
                    summary.accounts.push(counts);
                    continue;
                }
            };
            counts.fetched = candidates.len();

            let known: Ledger = store
                .documents()
                .iter()
                .filter(|(identity, _)| !carried_over.contains(*identity))
                .map(|(identity, doc)| (identity.clone(), doc.clone()))
                .collect();
            let filters =
                IngestFilters::new(account.allowed_senders.clone(), self.settings.lookback_days);
            let planned = plan_ingest(&candidates, &known, &filters, now);
            counts.ingested = planned.len();
            info!(fetched = counts.fetched, new = planned.len(), "planned ingest");

            for item in planned {
                let title = document_title(&item.message.subject);
                carried_over.remove(&item.identity);
                store.upsert(TrackedDocument::pending(
                    item.identity.as_str(),
                    name.as_str(),
                    title.as_str(),
                ));

                let outcome = deliver(
                    &self.renderer,
                    &mut self.device,
                    &self.settings.folder_name,
                    item.message,
                    &title,
                );
                match outcome {
                    Ok(remote_id) => {
                        info!(
                            identity = %item.identity,
                            remote_id = %remote_id,
                            title = %title,
                            "uploaded"
                        );
                        let doc = TrackedDocument::pending(
                            item.identity.as_str(),
                            name.as_str(),
                            title.as_str(),
                        )
                        .into_uploaded(remote_id, now);
                        store.upsert(doc);
                        uploaded_now.insert(item.identity.clone());
                        counts.uploaded += 1;
                    }
                    Err(ItemError::Auth(e)) => return abort_on_auth(store, e),
                    Err(ItemError::Failed(stage, reason)) => {
                        warn!(
                            identity = %item.identity,
                            %stage,
                            %reason,
                            "newsletter not uploaded"
                        );
                        counts.failed += 1;
                        summary.record_failure(Some(&item.identity), Some(&name), stage, reason);
                    }
                }
                store.save()?;
            }
            summary.accounts.push(counts);
        }
        Ok(())
    }

    fn expire(
        &mut self,
        store: &mut TrackerStore,
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let mut plan = plan_retention(store.documents(), self.settings.max_age_days, now);
        if let Some(limit) = self.settings.max_deletions_per_run {
            if plan.len() > limit {
                info!(deferred = plan.len() - limit, "deferring deletes to a later run");
                plan.truncate(limit);
            }
        }
        info!(
            expired = plan.len(),
            max_age_days = self.settings.max_age_days,
            "planned retention"
        );

        for identity in plan {
            let remote_id = store
                .get(&identity)
                .and_then(|doc| doc.remote_document_id.clone());
            let remote_id = match remote_id {
                Some(remote_id) => remote_id,
                None => continue,
            };
            match self.device.delete(&remote_id) {
                Ok(outcome) => {
                    if outcome == DeleteOutcome::NotFound {
                        info!(%identity, %remote_id, "document already gone from device");
                    } else {
                        info!(%identity, %remote_id, "deleted expired document");
                    }
                    store.mark_removed(&identity);
                    summary.deleted += 1;
                }
                Err(e) if e.is_auth() => return abort_on_auth(store, e),
                Err(e) => {
                    warn!(%identity, %remote_id, error = %e, "delete failed, will retry next run");
                    summary.delete_failed += 1;
                    summary.record_failure(Some(&identity), None, Stage::Delete, &e);
                }
            }
        }
        Ok(())
    }

    fn reconcile(
        &mut self,
        store: &mut TrackerStore,
        uploaded_now: &BTreeSet<Identity>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let remote_ids = match self.device.list_folder(&self.settings.folder_name) {
            Ok(Some(ids)) => ids,
            Ok(None) => {
                warn!(
                    folder = %self.settings.folder_name,
                    "folder not found on device, skipping reconciliation"
                );
                return Ok(());
            }
            Err(e) if e.is_auth() => return abort_on_auth(store, e),
            Err(e) => {
                warn!(error = %e, "could not list device folder, skipping reconciliation");
                return Ok(());
            }
        };

        let listed = remote_ids.iter().map(String::as_str);
        let vanished = plan_reconciliation(store.documents(), listed);
        for identity in vanished {
            // a listing may lag behind uploads made moments ago
            if uploaded_now.contains(&identity) {
                continue;
            }
            info!(%identity, "document no longer on device, marking it removed");
            store.mark_removed(&identity);
            summary.reconciled += 1;
        }
        Ok(())
    }

    /// Drop removed records once their messages have left the lookback window.
    fn purge(&self, store: &mut TrackerStore, now: DateTime<Utc>) {
        let plan = plan_purge(store.documents(), self.settings.lookback_days, now);
        if plan.is_empty() {
            return;
        }
        for identity in &plan {
            store.remove(identity);
        }
        debug!(purged = plan.len(), "forgot removed documents");
    }
}

enum ItemError {
    /// Left pending and retried next run.
    Failed(Stage, String),
    Auth(DeviceError),
}

fn deliver<R: Renderer, D: Device>(
    renderer: &R,
    device: &mut D,
    folder: &str,
    message: &MessageRef,
    title: &str,
) -> std::result::Result<String, ItemError> {
    let bytes = renderer
        .render(message)
        .map_err(|e| ItemError::Failed(Stage::Render, e.to_string()))?;
    let document = PdfDocument {
        title: title.to_string(),
        bytes,
    };
    device.upload(&document, folder).map_err(|e| match e.is_auth() {
        true => ItemError::Auth(e),
        false => ItemError::Failed(Stage::Upload, e.to_string()),
    })
}

/// Persist what we have and end the run: the device no longer accepts our credentials.
fn abort_on_auth<T>(store: &TrackerStore, e: DeviceError) -> Result<T> {
    error!(error = %e, "device rejected credentials, aborting run");
    store.save()?;
    Err(Error::DeviceAuth(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{day, message, FakeDevice, FakeMail, FakeRenderer};
    use crate::types::Status;
    use std::fs;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> SyncSettings {
        SyncSettings {
            tracker_path: dir.path().join("tracker.json"),
            ..SyncSettings::default()
        }
    }

    fn engine(
        dir: &TempDir,
        mails: Vec<FakeMail>,
        device: FakeDevice,
    ) -> SyncEngine<FakeRenderer, FakeDevice> {
        let accounts = mails
            .into_iter()
            .map(|m| MailAccount::new(Box::new(m), None))
            .collect();
        SyncEngine::new(accounts, FakeRenderer::default(), device, settings(dir))
    }

    fn reload(dir: &TempDir) -> TrackerStore {
        TrackerStore::load(dir.path().join("tracker.json")).unwrap()
    }

    fn uploaded(identity: &str, remote_id: &str, at: DateTime<Utc>) -> TrackedDocument {
        TrackedDocument::pending(identity, "me@gmail.com", identity)
            .into_uploaded(remote_id.to_string(), at)
    }

    #[test]
    fn uploads_new_messages_and_records_them() {
        let dir = TempDir::new().unwrap();
        let mail = FakeMail::new(
            "me@gmail.com",
            vec![
                message("a@x.com", "One", day(9)),
                message("b@y.com", "Two", day(9)),
            ],
        );
        let mut engine = engine(&dir, vec![mail], FakeDevice::default());

        let summary = engine.run(day(10)).unwrap();
        assert_eq!(summary.fetched(), 2);
        assert_eq!(summary.ingested(), 2);
        assert_eq!(summary.uploaded(), 2);
        assert_eq!(summary.failed(), 0);
        assert_eq!(engine.device().uploads, ["One", "Two"]);

        let store = reload(&dir);
        assert_eq!(store.len(), 2);
        for doc in store.documents().values() {
            assert_eq!(doc.status, Status::Uploaded);
            assert!(doc.remote_document_id.is_some());
            assert_eq!(doc.uploaded_at, Some(day(10)));
            assert_eq!(doc.source_account, "me@gmail.com");
        }
    }

    #[test]
    fn repeated_runs_never_upload_twice() {
        let dir = TempDir::new().unwrap();
        let messages = vec![
            message("a@x.com", "One", day(9)),
            message("a@x.com", "One", day(9)),
            message("b@y.com", "Two", day(9)),
        ];
        let mut engine = engine(
            &dir,
            vec![FakeMail::new("me@gmail.com", messages)],
            FakeDevice::default(),
        );
        for run in 0..3 {
            let summary = engine.run(day(10)).unwrap();
            assert_eq!(summary.uploaded(), if run == 0 { 2 } else { 0 });
        }
        assert_eq!(engine.device().uploads, ["One", "Two"]);
        assert_eq!(reload(&dir).len(), 2);
    }

    #[test]
    fn same_message_in_two_accounts_is_uploaded_once() {
        let dir = TempDir::new().unwrap();
        let mut shared = message("a@x.com", "Shared", day(9));
        shared.raw_message_identifier = Some("shared@x.com".into());
        let mut engine = engine(
            &dir,
            vec![
                FakeMail::new("me@gmail.com", vec![shared.clone()]),
                FakeMail::new("me@icloud.com", vec![shared]),
            ],
            FakeDevice::default(),
        );
        let summary = engine.run(day(10)).unwrap();
        assert_eq!(summary.accounts[0].uploaded, 1);
        assert_eq!(summary.accounts[1].fetched, 1);
        assert_eq!(summary.accounts[1].ingested, 0);
        assert_eq!(engine.device().uploads.len(), 1);
    }

    #[test]
    fn render_failure_is_retried_next_run() {
        let dir = TempDir::new().unwrap();
        let broken = message("a@x.com", "Broken", day(9));
        let identity = broken.identity();
        let mut engine = engine(
            &dir,
            vec![FakeMail::new(
                "me@gmail.com",
                vec![broken, message("b@y.com", "Fine", day(9))],
            )],
            FakeDevice::default(),
        );
        engine.renderer_mut().fail_subjects.insert("Broken".into());

        let summary = engine.run(day(10)).unwrap();
        assert_eq!(summary.uploaded(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failures[0].identity.as_deref(), Some(identity.as_str()));
        assert_eq!(summary.failures[0].stage, Stage::Render);
        assert_eq!(reload(&dir).get(&identity).unwrap().status, Status::Pending);

        engine.renderer_mut().fail_subjects.clear();
        let summary = engine.run(day(11)).unwrap();
        assert_eq!(summary.uploaded(), 1);
        let doc = reload(&dir).get(&identity).cloned().unwrap();
        assert_eq!(doc.status, Status::Uploaded);
        assert_eq!(doc.uploaded_at, Some(day(11)));
        assert_eq!(engine.device().uploads, ["Fine", "Broken"]);
    }

    #[test]
    fn upload_failure_leaves_record_pending() {
        let dir = TempDir::new().unwrap();
        let mut device = FakeDevice::default();
        device.fail_upload_titles.insert("Flaky".into());
        let flaky = message("a@x.com", "Flaky", day(9));
        let mut engine = engine(
            &dir,
            vec![FakeMail::new("me@gmail.com", vec![flaky.clone()])],
            device,
        );

        let summary = engine.run(day(10)).unwrap();
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failures[0].stage, Stage::Upload);
        let doc = reload(&dir).get(&flaky.identity()).cloned().unwrap();
        assert_eq!(doc.status, Status::Pending);
        assert_eq!(doc.remote_document_id, None);
    }

    #[test]
    fn failed_account_does_not_block_others() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(
            &dir,
            vec![
                FakeMail::failing("down@icloud.com"),
                FakeMail::new("me@gmail.com", vec![message("a@x.com", "One", day(9))]),
            ],
            FakeDevice::default(),
        );
        let summary = engine.run(day(10)).unwrap();
        assert!(summary.accounts[0].fetch_error.is_some());
        assert_eq!(summary.accounts[1].uploaded, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].stage, Stage::Fetch);
    }

    #[test]
    fn corrupt_tracker_aborts_before_any_call() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracker.json");
        fs::write(&path, b"not json").unwrap();
        let mail = FakeMail::new("me@gmail.com", vec![message("a@x.com", "One", day(9))]);
        let fetches = mail.fetches.clone();
        let mut engine = engine(&dir, vec![mail], FakeDevice::default());

        assert!(matches!(
            engine.run(day(10)),
            Err(Error::CorruptState { .. })
        ));
        assert_eq!(fetches.get(), 0);
        assert!(engine.device().uploads.is_empty());
        assert!(engine.device().deletes.is_empty());
        assert_eq!(fs::read(&path).unwrap(), b"not json");
    }

    #[test]
    fn expired_documents_are_deleted() {
        let dir = TempDir::new().unwrap();
        let mut store = reload(&dir);
        store.upsert(uploaded("old", "r-old", day(0)));
        store.upsert(uploaded("edge", "r-edge", day(1)));
        store.upsert(uploaded("gone", "r-gone", day(0)));
        store.save().unwrap();

        let device = FakeDevice::default()
            .with_document("r-old", "Newsletters", "Old")
            .with_document("r-edge", "Newsletters", "Edge");
        let mut engine = engine(&dir, vec![], device);
        let summary = engine.run(day(31)).unwrap();

        assert_eq!(summary.deleted, 2);
        assert_eq!(engine.device().deletes, ["r-gone", "r-old"]);
        let store = reload(&dir);
        // both are long outside the lookback window, so nothing is kept for them
        assert!(!store.contains("old"));
        assert!(!store.contains("gone"));
        assert!(store.contains("edge"));
    }

    #[test]
    fn failed_delete_keeps_record() {
        let dir = TempDir::new().unwrap();
        let mut store = reload(&dir);
        store.upsert(uploaded("old", "r-old", day(0)));
        store.save().unwrap();

        let mut device = FakeDevice::default().with_document("r-old", "Newsletters", "Old");
        device.fail_delete_ids.insert("r-old".into());
        let mut engine = engine(&dir, vec![], device);
        let summary = engine.run(day(40)).unwrap();

        assert_eq!(summary.deleted, 0);
        assert_eq!(summary.delete_failed, 1);
        assert_eq!(summary.failures[0].stage, Stage::Delete);
        assert_eq!(reload(&dir).get("old").unwrap().status, Status::Uploaded);

        engine.device_mut().fail_delete_ids.clear();
        assert_eq!(engine.run(day(41)).unwrap().deleted, 1);
        assert!(reload(&dir).is_empty());
    }

    #[test]
    fn deletes_are_capped_oldest_first() {
        let dir = TempDir::new().unwrap();
        let mut store = reload(&dir);
        let mut device = FakeDevice::default();
        for (i, id) in ["c", "a", "b"].iter().enumerate() {
            let remote = format!("r-{}", id);
            store.upsert(uploaded(id, &remote, day(i as i64)));
            device = device.with_document(&remote, "Newsletters", id);
        }
        store.save().unwrap();

        let mut engine = engine(&dir, vec![], device);
        engine.settings.max_deletions_per_run = Some(2);
        let summary = engine.run(day(60)).unwrap();
        assert_eq!(summary.deleted, 2);
        assert_eq!(engine.device().deletes, ["r-c", "r-a"]);
        assert!(reload(&dir).contains("b"));
    }

    #[test]
    fn expired_auth_aborts_and_keeps_progress() {
        let dir = TempDir::new().unwrap();
        let mut device = FakeDevice::default();
        device.unauthorized = true;
        let first = message("a@x.com", "One", day(9));
        let mut engine = engine(
            &dir,
            vec![FakeMail::new(
                "me@gmail.com",
                vec![first.clone(), message("a@x.com", "Two", day(9))],
            )],
            device,
        );

        assert!(matches!(engine.run(day(10)), Err(Error::DeviceAuth(_))));
        let store = reload(&dir);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&first.identity()).unwrap().status, Status::Pending);
    }

    #[test]
    fn reconciliation_marks_vanished_documents_removed() {
        let dir = TempDir::new().unwrap();
        let mut store = reload(&dir);
        store.upsert(uploaded("kept", "r-kept", day(5)));
        store.upsert(uploaded("vanished", "r-vanished", day(5)));
        store.save().unwrap();

        let device = FakeDevice::default().with_document("r-kept", "Newsletters", "Kept");
        let mut engine = engine(
            &dir,
            vec![FakeMail::new("acct", vec![message("a@x.com", "Fresh", day(9))])],
            device,
        );
        let summary = engine.run(day(10)).unwrap();
        assert_eq!(summary.reconciled, 1);
        assert_eq!(summary.uploaded(), 1);
        let store = reload(&dir);
        assert_eq!(store.get("kept").unwrap().status, Status::Uploaded);
        let vanished = store.get("vanished").unwrap();
        assert_eq!(vanished.status, Status::Removed);
        assert_eq!(vanished.uploaded_at, Some(day(5)));
        assert_eq!(store.len(), 3);

        // a second run has nothing left to reconcile
        assert_eq!(engine.run(day(11)).unwrap().reconciled, 0);
    }

    #[test]
    fn document_deleted_by_hand_is_not_uploaded_again() {
        let dir = TempDir::new().unwrap();
        let one = message("a@x.com", "One", day(0));
        let mut engine = engine(
            &dir,
            vec![FakeMail::new("me@gmail.com", vec![one.clone()])],
            FakeDevice::default(),
        );
        assert_eq!(engine.run(day(0)).unwrap().uploaded(), 1);

        // the reader deletes it on the tablet
        engine.device_mut().documents.clear();
        let summary = engine.run(day(1)).unwrap();
        assert_eq!(summary.reconciled, 1);
        assert_eq!(summary.uploaded(), 0);

        for n in 2..=7 {
            let summary = engine.run(day(n)).unwrap();
            assert_eq!(summary.uploaded(), 0, "day {}", n);
            assert_eq!(summary.reconciled, 0, "day {}", n);
        }
        assert_eq!(engine.device().uploads, ["One"]);
        assert_eq!(reload(&dir).get(&one.identity()).unwrap().status, Status::Removed);

        // once the message is outside the lookback window the record is forgotten
        assert_eq!(engine.run(day(8)).unwrap().uploaded(), 0);
        assert!(reload(&dir).is_empty());
        assert_eq!(engine.device().uploads, ["One"]);
    }

    #[test]
    fn expired_document_inside_a_long_lookback_is_not_uploaded_again() {
        let dir = TempDir::new().unwrap();
        let one = message("a@x.com", "One", day(0));
        let mut engine = engine(
            &dir,
            vec![FakeMail::new("me@gmail.com", vec![one.clone()])],
            FakeDevice::default(),
        );
        engine.settings.lookback_days = 60;
        engine.settings.max_age_days = 30;

        assert_eq!(engine.run(day(0)).unwrap().uploaded(), 1);
        assert_eq!(engine.run(day(31)).unwrap().deleted, 1);
        for n in [32, 45, 60] {
            let summary = engine.run(day(n)).unwrap();
            assert_eq!(summary.uploaded(), 0, "day {}", n);
            assert_eq!(summary.deleted, 0, "day {}", n);
        }
        assert_eq!(engine.device().uploads, ["One"]);
        assert_eq!(engine.device().deletes.len(), 1);
        assert_eq!(reload(&dir).get(&one.identity()).unwrap().status, Status::Removed);

        engine.run(day(61)).unwrap();
        assert!(reload(&dir).is_empty());
        assert_eq!(engine.device().uploads, ["One"]);
    }

    #[test]
    fn failed_listing_skips_reconciliation() {
        let dir = TempDir::new().unwrap();
        let mut store = reload(&dir);
        store.upsert(
            TrackedDocument::pending("vanished", "acct", "Vanished")
                .into_uploaded("r-vanished".into(), day(5)),
        );
        store.save().unwrap();

        let mut device = FakeDevice::default();
        device.fail_listing = true;
        let mut engine = engine(&dir, vec![], device);
        assert_eq!(engine.run(day(10)).unwrap().reconciled, 0);
        assert!(reload(&dir).contains("vanished"));
    }

    #[test]
    fn ingest_checkpoint_survives_interrupted_cleanup() {
        let dir = TempDir::new().unwrap();
        let mail = FakeMail::new("acct", vec![message("a@x.com", "One", day(0))]);
        let mut ingest_only = engine(&dir, vec![mail], FakeDevice::default());
        ingest_only.settings.skip_cleanup = true;
        ingest_only.run(day(0)).unwrap();
        let remote = ingest_only.device().documents.clone();

        // a later process, with a device that still holds the upload
        let mut device = FakeDevice::default();
        device.documents = remote;
        let mut later = engine(&dir, vec![], device);
        let summary = later.run(day(31)).unwrap();
        assert_eq!(summary.deleted, 1);
        assert!(reload(&dir).is_empty());
    }

    #[test]
    fn sender_filter_is_applied_per_account() {
        let dir = TempDir::new().unwrap();
        let mail = FakeMail::new(
            "acct",
            vec![
                message("editor@letters.com", "Wanted", day(9)),
                message("promo@shop.com", "Unwanted", day(9)),
            ],
        );
        let accounts = vec![MailAccount::new(
            Box::new(mail),
            Some(vec!["letters.com".into()]),
        )];
        let mut engine = SyncEngine::new(
            accounts,
            FakeRenderer::default(),
            FakeDevice::default(),
            settings(&dir),
        );
        let summary = engine.run(day(10)).unwrap();
        assert_eq!(summary.fetched(), 2);
        assert_eq!(summary.ingested(), 1);
        assert_eq!(engine.device().uploads, ["Wanted"]);
    }
}
