//! Integration tests for the metadata cache
//!
//! These tests run the cache against a real in-memory SQLite file index and a
//! real credential manager, with the remote services faked:
//! - Freshness decisions (empty, aged, straggler and unstamped records)
//! - Single-flight resynchronization
//! - Failure and timeout handling (cache left empty, retried on next read)
//! - Point updates after confirmed uploads and deletes

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    storage::{FileDownload, RemoteFile, RemoteFileClient, UploadedFile},
    time::ManualClock,
    ByteStream,
};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use core_auth::{
    AuthError, CredentialManager, CredentialManagerConfig, OAuthClientCredentials,
    RefreshedAccessToken, RemoteAuthClient, SqliteTokenStore,
};
use core_library::{
    db::create_test_pool, CachedFileRecord, FileIndexStore, SqliteFileIndexStore, UserId,
};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_sync::{MetadataCache, MetadataCacheConfig, SyncError};
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::task::JoinSet;

// ============================================================================
// Fakes
// ============================================================================

/// Remote file service whose listing can be swapped, failed or slowed down.
struct FakeRemote {
    list_calls: AtomicUsize,
    files: StdMutex<Vec<RemoteFile>>,
    failure: StdMutex<Option<u16>>,
    delay: Duration,
}

impl FakeRemote {
    fn new(files: Vec<RemoteFile>) -> Self {
        Self {
            list_calls: AtomicUsize::new(0),
            files: StdMutex::new(files),
            failure: StdMutex::new(None),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn set_files(&self, files: Vec<RemoteFile>) {
        *self.files.lock().unwrap() = files;
    }

    fn fail_with(&self, status: Option<u16>) {
        *self.failure.lock().unwrap() = status;
    }

    fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteFileClient for FakeRemote {
    async fn list_owned_files(&self, access_token: &str) -> BridgeResult<Vec<RemoteFile>> {
        assert_eq!(access_token, "access-1");
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = *self.failure.lock().unwrap();
        match failure {
            Some(status) => Err(BridgeError::Remote {
                status,
                message: "listing unavailable".to_string(),
            }),
            None => Ok(self.files.lock().unwrap().clone()),
        }
    }

    async fn upload_file(
        &self,
        _access_token: &str,
        _name: &str,
        _mime_type: &str,
        _content: ByteStream,
    ) -> BridgeResult<UploadedFile> {
        Err(BridgeError::NotAvailable("upload_file".to_string()))
    }

    async fn get_file_metadata_and_content(
        &self,
        _access_token: &str,
        _remote_file_id: &str,
    ) -> BridgeResult<FileDownload> {
        Err(BridgeError::NotAvailable("get_file_metadata_and_content".to_string()))
    }

    async fn delete_file(&self, _access_token: &str, _remote_file_id: &str) -> BridgeResult<()> {
        Err(BridgeError::NotAvailable("delete_file".to_string()))
    }
}

mock! {
    RemoteFiles {}

    #[async_trait]
    impl RemoteFileClient for RemoteFiles {
        async fn list_owned_files(&self, access_token: &str) -> BridgeResult<Vec<RemoteFile>>;
        async fn upload_file(
            &self,
            access_token: &str,
            name: &str,
            mime_type: &str,
            content: ByteStream,
        ) -> BridgeResult<UploadedFile>;
        async fn get_file_metadata_and_content(
            &self,
            access_token: &str,
            remote_file_id: &str,
        ) -> BridgeResult<FileDownload>;
        async fn delete_file(&self, access_token: &str, remote_file_id: &str) -> BridgeResult<()>;
    }
}

/// Token endpoint that should never be reached while credentials are fresh.
#[derive(Default)]
struct CountingAuthClient {
    calls: AtomicUsize,
}

#[async_trait]
impl RemoteAuthClient for CountingAuthClient {
    async fn refresh(
        &self,
        _refresh_token: &str,
        _client_id: &str,
        _client_secret: &str,
    ) -> core_auth::Result<RefreshedAccessToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AuthError::RefreshFailed("unexpected refresh".to_string()))
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    cache: Arc<MetadataCache>,
    index: Arc<SqliteFileIndexStore>,
    credentials: Arc<CredentialManager>,
    auth_client: Arc<CountingAuthClient>,
    clock: Arc<ManualClock>,
    event_bus: EventBus,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

fn alice() -> UserId {
    UserId::new("alice").unwrap()
}

fn remote_file(id: &str, name: &str) -> RemoteFile {
    RemoteFile {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: "text/plain".to_string(),
        size_bytes: Some(42),
    }
}

fn cached(user: &UserId, id: &str, name: &str, synced_at: Option<DateTime<Utc>>) -> CachedFileRecord {
    CachedFileRecord {
        user_id: user.clone(),
        remote_file_id: id.to_string(),
        file_name: name.to_string(),
        mime_type: "text/plain".to_string(),
        size_bytes: Some(7),
        last_synced_at: synced_at,
    }
}

async fn harness_with(remote: Arc<dyn RemoteFileClient>, config: MetadataCacheConfig) -> Harness {
    let pool = create_test_pool().await.unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let event_bus = EventBus::new(64);
    let auth_client = Arc::new(CountingAuthClient::default());

    let credentials = Arc::new(CredentialManager::new(
        Arc::new(SqliteTokenStore::with_clock(pool.clone(), clock.clone())),
        auth_client.clone(),
        OAuthClientCredentials::new("client-id", "client-secret"),
        clock.clone(),
        event_bus.clone(),
        CredentialManagerConfig::default(),
    ));
    let index = Arc::new(SqliteFileIndexStore::new(pool));
    let cache = Arc::new(MetadataCache::new(
        index.clone(),
        credentials.clone(),
        remote,
        clock.clone(),
        event_bus.clone(),
        config,
    ));

    Harness {
        cache,
        index,
        credentials,
        auth_client,
        clock,
        event_bus,
    }
}

/// Harness with a registered, fresh credential for alice.
async fn harness(remote: Arc<dyn RemoteFileClient>) -> Harness {
    let h = harness_with(remote, MetadataCacheConfig::default()).await;
    h.credentials
        .register_credential(&alice(), "access-1", "refresh-1", 3600)
        .await
        .unwrap();
    h
}

// ============================================================================
// Freshness
// ============================================================================

#[tokio::test]
async fn test_empty_cache_lists_remote_once_and_persists() {
    let remote = Arc::new(FakeRemote::new(vec![
        remote_file("f2", "b.txt"),
        remote_file("f1", "a.txt"),
    ]));
    let h = harness(remote.clone()).await;

    let files = h.cache.list_files(&alice()).await.unwrap();

    assert_eq!(remote.list_calls(), 1);
    assert_eq!(
        files.iter().map(|f| f.file_name.as_str()).collect::<Vec<_>>(),
        vec!["a.txt", "b.txt"]
    );
    assert!(files.iter().all(|f| f.last_synced_at == Some(start())));
    assert_eq!(h.index.find_by_user(&alice()).await.unwrap(), files);
}

#[tokio::test]
async fn test_recent_cache_is_served_without_remote_calls() {
    let mut remote = MockRemoteFiles::new();
    remote.expect_list_owned_files().never();
    let h = harness(Arc::new(remote)).await;

    let synced = start() - ChronoDuration::seconds(10);
    let seeded = vec![
        cached(&alice(), "f1", "a.txt", Some(synced)),
        cached(&alice(), "f2", "b.txt", Some(synced)),
    ];
    h.index.replace_all_for_user(&alice(), &seeded).await.unwrap();

    let files = h.cache.list_files(&alice()).await.unwrap();

    assert_eq!(files, seeded);
    assert_eq!(h.auth_client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_single_straggler_forces_full_resync() {
    let remote = Arc::new(FakeRemote::new(vec![remote_file("f3", "c.txt")]));
    let h = harness(remote.clone()).await;
    h.index
        .replace_all_for_user(
            &alice(),
            &[
                cached(&alice(), "f1", "a.txt", Some(start() - ChronoDuration::seconds(20))),
                cached(&alice(), "f2", "b.txt", Some(start() - ChronoDuration::seconds(1))),
            ],
        )
        .await
        .unwrap();

    let files = h.cache.list_files(&alice()).await.unwrap();

    assert_eq!(remote.list_calls(), 1);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].remote_file_id, "f3");
    assert_eq!(h.index.count_for_user(&alice()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unstamped_record_forces_resync() {
    let remote = Arc::new(FakeRemote::new(vec![remote_file("f1", "a.txt")]));
    let h = harness(remote.clone()).await;
    h.index
        .replace_all_for_user(&alice(), &[cached(&alice(), "f1", "a.txt", None)])
        .await
        .unwrap();

    let files = h.cache.list_files(&alice()).await.unwrap();

    assert_eq!(remote.list_calls(), 1);
    assert_eq!(files[0].last_synced_at, Some(start()));
}

#[tokio::test]
async fn test_cache_goes_stale_as_clock_advances() {
    let remote = Arc::new(FakeRemote::new(vec![remote_file("f1", "a.txt")]));
    let h = harness(remote.clone()).await;

    h.cache.list_files(&alice()).await.unwrap();
    h.clock.advance(ChronoDuration::seconds(15));
    h.cache.list_files(&alice()).await.unwrap();
    assert_eq!(remote.list_calls(), 1);

    h.clock.advance(ChronoDuration::seconds(1));
    h.cache.list_files(&alice()).await.unwrap();
    assert_eq!(remote.list_calls(), 2);
}

#[tokio::test]
async fn test_freshness_is_measured_from_the_latest_sync() {
    let remote = Arc::new(FakeRemote::new(vec![remote_file("f1", "a.txt")]));
    let h = harness(remote.clone()).await;
    let later = start() + ChronoDuration::minutes(10);

    h.cache.list_files(&alice()).await.unwrap();
    h.clock.set(later);
    let files = h.cache.list_files(&alice()).await.unwrap();
    assert_eq!(remote.list_calls(), 2);
    assert_eq!(files[0].last_synced_at, Some(later));

    h.clock.set(later + ChronoDuration::seconds(15));
    h.cache.list_files(&alice()).await.unwrap();
    assert_eq!(remote.list_calls(), 2);
}

#[tokio::test]
async fn test_is_stale_predicate() {
    let h = harness(Arc::new(FakeRemote::new(vec![]))).await;
    let now = start();
    let at_window = cached(&alice(), "f1", "a.txt", Some(now - ChronoDuration::seconds(15)));
    let past_window = cached(&alice(), "f2", "b.txt", Some(now - ChronoDuration::milliseconds(15_001)));

    assert!(h.cache.is_stale(&[], now));
    assert!(!h.cache.is_stale(std::slice::from_ref(&at_window), now));
    assert!(h.cache.is_stale(&[at_window, past_window], now));
    assert!(h.cache.is_stale(&[cached(&alice(), "f3", "c.txt", None)], now));
}

// ============================================================================
// Resync behavior
// ============================================================================

#[tokio::test]
async fn test_concurrent_stale_reads_share_one_resync() {
    let remote = Arc::new(
        FakeRemote::new(vec![remote_file("f1", "a.txt"), remote_file("f2", "b.txt")])
            .with_delay(Duration::from_millis(100)),
    );
    let h = harness(remote.clone()).await;

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let cache = h.cache.clone();
        tasks.spawn(async move { cache.list_files(&alice()).await });
    }

    while let Some(joined) = tasks.join_next().await {
        let files = joined.unwrap().unwrap();
        assert_eq!(files.len(), 2);
    }

    assert_eq!(remote.list_calls(), 1);
    assert_eq!(h.index.count_for_user(&alice()).await.unwrap(), 2);
}

async fn concurrent_listings(
    h: &Harness,
    callers: usize,
) -> Vec<Result<Vec<CachedFileRecord>, SyncError>> {
    let mut tasks = JoinSet::new();
    for _ in 0..callers {
        let cache = h.cache.clone();
        tasks.spawn(async move { cache.list_files(&alice()).await });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.unwrap());
    }
    results
}

#[tokio::test]
async fn test_concurrent_reads_share_one_empty_resync() {
    let remote = Arc::new(FakeRemote::new(Vec::new()).with_delay(Duration::from_millis(100)));
    let h = harness(remote.clone()).await;

    let results = concurrent_listings(&h, 8).await;

    assert_eq!(remote.list_calls(), 1);
    assert_eq!(results.len(), 8);
    assert!(results
        .iter()
        .all(|result| matches!(result, Ok(files) if files.is_empty())));
}

#[tokio::test]
async fn test_concurrent_reads_share_one_failed_resync() {
    let remote = Arc::new(
        FakeRemote::new(vec![remote_file("f1", "a.txt")]).with_delay(Duration::from_millis(100)),
    );
    remote.fail_with(Some(503));
    let h = harness(remote.clone()).await;
    let mut events = h.event_bus.subscribe();

    let results = concurrent_listings(&h, 8).await;

    assert_eq!(remote.list_calls(), 1);
    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|result| matches!(
        result,
        Err(SyncError::RemoteList(e)) if e.status() == Some(503)
    )));

    let mut started = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, CoreEvent::Cache(CacheEvent::ResyncStarted { .. })) {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    // The failure is not remembered past its flight.
    remote.fail_with(None);
    let files = h.cache.list_files(&alice()).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(remote.list_calls(), 2);
}

#[tokio::test]
async fn test_listing_failure_leaves_cache_empty_and_next_read_retries() {
    let remote = Arc::new(FakeRemote::new(vec![remote_file("new", "new.txt")]));
    let h = harness(remote.clone()).await;
    h.index
        .replace_all_for_user(
            &alice(),
            &[cached(&alice(), "old", "old.txt", Some(start() - ChronoDuration::minutes(5)))],
        )
        .await
        .unwrap();
    remote.fail_with(Some(503));

    let err = h.cache.list_files(&alice()).await.unwrap_err();
    assert!(matches!(err, SyncError::RemoteList(ref e) if e.status() == Some(503)));
    assert!(!err.is_timeout());
    assert_eq!(h.index.count_for_user(&alice()).await.unwrap(), 0);

    remote.fail_with(None);
    let files = h.cache.list_files(&alice()).await.unwrap();

    assert_eq!(remote.list_calls(), 2);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].remote_file_id, "new");
}

#[tokio::test]
async fn test_listing_timeout_is_distinguishable() {
    let remote = Arc::new(
        FakeRemote::new(vec![remote_file("f1", "a.txt")]).with_delay(Duration::from_secs(5)),
    );
    let config = MetadataCacheConfig {
        remote_timeout: Duration::from_millis(50),
        ..MetadataCacheConfig::default()
    };
    let h = harness_with(remote.clone(), config).await;
    h.credentials
        .register_credential(&alice(), "access-1", "refresh-1", 3600)
        .await
        .unwrap();

    let err = h.cache.list_files(&alice()).await.unwrap_err();

    assert!(matches!(err, SyncError::Timeout { timeout_ms: 50, .. }));
    assert!(err.is_timeout());
    assert_eq!(h.index.count_for_user(&alice()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_credential_empties_cache_without_remote_call() {
    let remote = Arc::new(FakeRemote::new(vec![remote_file("f1", "a.txt")]));
    let h = harness_with(remote.clone(), MetadataCacheConfig::default()).await;
    h.index
        .replace_all_for_user(
            &alice(),
            &[cached(&alice(), "f1", "a.txt", Some(start() - ChronoDuration::minutes(1)))],
        )
        .await
        .unwrap();

    let err = h.cache.list_files(&alice()).await.unwrap_err();

    assert!(matches!(err, SyncError::Auth(AuthError::NoCredential { .. })));
    assert_eq!(remote.list_calls(), 0);
    assert_eq!(h.index.count_for_user(&alice()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_forced_resync_ignores_freshness() {
    let remote = Arc::new(FakeRemote::new(vec![remote_file("f1", "a.txt")]));
    let h = harness(remote.clone()).await;

    h.cache.list_files(&alice()).await.unwrap();
    remote.set_files(vec![remote_file("f1", "a.txt"), remote_file("f9", "z.txt")]);
    let files = h.cache.resync(&alice()).await.unwrap();

    assert_eq!(remote.list_calls(), 2);
    assert_eq!(files.len(), 2);
}

#[tokio::test]
async fn test_users_are_cached_independently() {
    let remote = Arc::new(FakeRemote::new(vec![remote_file("f1", "a.txt")]));
    let h = harness(remote.clone()).await;
    let bob = UserId::new("bob").unwrap();
    h.credentials
        .register_credential(&bob, "access-1", "refresh-1", 3600)
        .await
        .unwrap();

    h.cache.list_files(&alice()).await.unwrap();
    let bob_files = h.cache.list_files(&bob).await.unwrap();

    assert_eq!(remote.list_calls(), 2);
    assert_eq!(bob_files[0].user_id, bob);
    assert_eq!(h.index.count_for_user(&alice()).await.unwrap(), 1);
    assert_eq!(h.index.count_for_user(&bob).await.unwrap(), 1);
}

#[tokio::test]
async fn test_resync_emits_cache_events() {
    let remote = Arc::new(FakeRemote::new(vec![
        remote_file("f1", "a.txt"),
        remote_file("f2", "b.txt"),
    ]));
    let h = harness(remote).await;
    let mut events = h.event_bus.subscribe();

    h.cache.list_files(&alice()).await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Cache(CacheEvent::ResyncStarted {
            user_id: "alice".to_string()
        })
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Cache(CacheEvent::ResyncCompleted {
            user_id: "alice".to_string(),
            file_count: 2
        })
    );
}

#[tokio::test]
async fn test_failed_resync_emits_failure_event() {
    let remote = Arc::new(FakeRemote::new(vec![]));
    remote.fail_with(Some(500));
    let h = harness(remote).await;
    let mut events = h.event_bus.subscribe();

    assert!(h.cache.list_files(&alice()).await.is_err());

    assert!(matches!(
        events.recv().await.unwrap(),
        CoreEvent::Cache(CacheEvent::ResyncStarted { .. })
    ));
    match events.recv().await.unwrap() {
        CoreEvent::Cache(CacheEvent::ResyncFailed { user_id, message }) => {
            assert_eq!(user_id, "alice");
            assert!(message.contains("listing unavailable"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

// ============================================================================
// Point updates
// ============================================================================

#[tokio::test]
async fn test_record_upload_inserts_stamped_record() {
    let h = harness(Arc::new(FakeRemote::new(vec![]))).await;

    let record = h
        .cache
        .record_upload(
            &alice(),
            UploadedFile {
                id: "up-1".to_string(),
                name: "report.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(record.last_synced_at, Some(start()));
    assert_eq!(record.size_bytes, None);
    assert_eq!(h.index.find_by_user(&alice()).await.unwrap(), vec![record]);
}

#[tokio::test]
async fn test_record_delete_removes_cached_record() {
    let h = harness(Arc::new(FakeRemote::new(vec![]))).await;
    h.index
        .replace_all_for_user(
            &alice(),
            &[
                cached(&alice(), "f1", "a.txt", Some(start())),
                cached(&alice(), "f2", "b.txt", Some(start())),
            ],
        )
        .await
        .unwrap();

    assert!(h.cache.record_delete(&alice(), "f1").await.unwrap());

    let remaining = h.index.find_by_user(&alice()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].remote_file_id, "f2");
}

#[tokio::test]
async fn test_record_delete_of_uncached_file_is_a_no_op() {
    let h = harness(Arc::new(FakeRemote::new(vec![]))).await;
    let seeded = vec![cached(&alice(), "f1", "a.txt", Some(start()))];
    h.index.replace_all_for_user(&alice(), &seeded).await.unwrap();

    assert!(!h.cache.record_delete(&alice(), "missing").await.unwrap());
    assert_eq!(h.index.find_by_user(&alice()).await.unwrap(), seeded);
}
