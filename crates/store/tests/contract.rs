//! Contract tests run against every backend.

use futures::future::join_all;
use grantstore_store::{InMemoryTokenStore, ManualClock, SqliteTokenStore};
use grantstore_types::{
    AccessToken, AuthenticationContext, AuthorizationRequest, RefreshToken, StoreError,
    TokenStore,
};
use std::sync::Arc;

const T0: u64 = 1_700_000_000;

fn ctx(user: &str) -> AuthenticationContext {
    AuthenticationContext::new(
        user,
        AuthorizationRequest::new("web-app")
            .with_scope(["read", "write"])
            .with_redirect_uri("https://app.example/callback"),
    )
}

async fn memory(clock: &Arc<ManualClock>) -> Arc<dyn TokenStore> {
    Arc::new(InMemoryTokenStore::new().with_clock(clock.clone()))
}

async fn sqlite(clock: &Arc<ManualClock>) -> Arc<dyn TokenStore> {
    Arc::new(
        SqliteTokenStore::new("sqlite::memory:")
            .await
            .unwrap()
            .with_clock(clock.clone()),
    )
}

macro_rules! for_each_backend {
    ($($name:ident),* $(,)?) => {
        mod memory_backend {
            $(
                #[tokio::test]
                async fn $name() {
                    let clock = std::sync::Arc::new(super::ManualClock::new(super::T0));
                    let store = super::memory(&clock).await;
                    super::$name(store, clock).await;
                }
            )*
        }
        mod sqlite_backend {
            $(
                #[tokio::test]
                async fn $name() {
                    let clock = std::sync::Arc::new(super::ManualClock::new(super::T0));
                    let store = super::sqlite(&clock).await;
                    super::$name(store, clock).await;
                }
            )*
        }
    };
}

for_each_backend!(
    read_returns_stored_token,
    supersedes_token_for_same_key,
    restoring_same_token_is_not_supersession,
    different_keys_do_not_supersede,
    remove_access_token_is_idempotent,
    remove_keeps_newer_key_mapping,
    cascade_removes_linked_access_token,
    cascade_with_unknown_refresh_is_noop,
    cascade_reaches_tokens_under_other_keys,
    remove_refresh_token_does_not_cascade,
    refresh_token_roundtrip,
    expired_access_token_is_absent,
    expired_refresh_token_is_absent,
    empty_values_are_rejected,
    find_tokens_by_client_and_user,
    purge_evicts_expired_records,
    clear_empties_store,
);

async fn read_returns_stored_token(store: Arc<dyn TokenStore>, _clock: Arc<ManualClock>) {
    let token = AccessToken::new("AT1")
        .with_expires_at(T0 + 3600)
        .with_scope(["read"]);
    store.store_access_token(&token, &ctx("alice")).await.unwrap();

    assert_eq!(store.read_access_token("AT1").await.unwrap(), Some(token.clone()));
    assert_eq!(
        store.read_authentication(&token).await.unwrap(),
        Some(ctx("alice"))
    );
    assert_eq!(store.get_access_token(&ctx("alice")).await.unwrap(), Some(token));
    assert!(store.read_access_token("missing").await.unwrap().is_none());
}

async fn supersedes_token_for_same_key(store: Arc<dyn TokenStore>, _clock: Arc<ManualClock>) {
    let c1 = ctx("alice");
    store
        .store_access_token(&AccessToken::new("AT1"), &c1)
        .await
        .unwrap();
    assert_eq!(
        store.get_access_token(&c1).await.unwrap().map(|t| t.value),
        Some("AT1".to_string())
    );

    store
        .store_access_token(&AccessToken::new("AT2"), &c1)
        .await
        .unwrap();
    assert_eq!(
        store.get_access_token(&c1).await.unwrap().map(|t| t.value),
        Some("AT2".to_string())
    );
    assert!(store.read_access_token("AT1").await.unwrap().is_none());
    assert!(store.read_authentication_by_value("AT1").await.unwrap().is_none());

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.access_tokens, 1);
    assert_eq!(stats.auth_key_entries, 1);
}

async fn restoring_same_token_is_not_supersession(
    store: Arc<dyn TokenStore>,
    _clock: Arc<ManualClock>,
) {
    let token = AccessToken::new("AT1").with_refresh(RefreshToken::new("RT1"));
    store.store_access_token(&token, &ctx("alice")).await.unwrap();
    store.store_access_token(&token, &ctx("alice")).await.unwrap();
    assert_eq!(store.get_access_token(&ctx("alice")).await.unwrap(), Some(token));
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.access_tokens, 1);
    assert_eq!(stats.refresh_links, 1);
}

async fn different_keys_do_not_supersede(store: Arc<dyn TokenStore>, _clock: Arc<ManualClock>) {
    store
        .store_access_token(&AccessToken::new("AT-alice"), &ctx("alice"))
        .await
        .unwrap();
    store
        .store_access_token(&AccessToken::new("AT-bob"), &ctx("bob"))
        .await
        .unwrap();
    assert!(store.read_access_token("AT-alice").await.unwrap().is_some());
    assert!(store.read_access_token("AT-bob").await.unwrap().is_some());
}

async fn remove_access_token_is_idempotent(store: Arc<dyn TokenStore>, _clock: Arc<ManualClock>) {
    let token = AccessToken::new("AT1");
    store.store_access_token(&token, &ctx("alice")).await.unwrap();
    store.remove_access_token("AT1").await.unwrap();
    store.remove_access_token("AT1").await.unwrap();

    assert!(store.read_access_token("AT1").await.unwrap().is_none());
    assert!(store.read_authentication(&token).await.unwrap().is_none());
    assert!(store.get_access_token(&ctx("alice")).await.unwrap().is_none());
    assert_eq!(store.stats().await.unwrap().auth_key_entries, 0);
}

async fn remove_keeps_newer_key_mapping(store: Arc<dyn TokenStore>, _clock: Arc<ManualClock>) {
    // AT1 was superseded by AT2; removing the stale AT1 must leave AT2 resolvable.
    store
        .store_access_token(&AccessToken::new("AT1"), &ctx("alice"))
        .await
        .unwrap();
    store
        .store_access_token(&AccessToken::new("AT2"), &ctx("alice"))
        .await
        .unwrap();
    store.remove_access_token("AT1").await.unwrap();
    assert_eq!(
        store.get_access_token(&ctx("alice")).await.unwrap().map(|t| t.value),
        Some("AT2".to_string())
    );
}

async fn cascade_removes_linked_access_token(
    store: Arc<dyn TokenStore>,
    _clock: Arc<ManualClock>,
) {
    let c1 = ctx("alice");
    let rt = RefreshToken::new("RT1");
    store.store_refresh_token(&rt, &c1).await.unwrap();
    store
        .store_access_token(&AccessToken::new("AT3").with_refresh(rt.clone()), &c1)
        .await
        .unwrap();

    store
        .remove_access_token_using_refresh_token("RT1")
        .await
        .unwrap();

    assert!(store.read_access_token("AT3").await.unwrap().is_none());
    assert!(store.get_access_token(&c1).await.unwrap().is_none());
    // The refresh token itself is the caller's to remove.
    assert_eq!(store.read_refresh_token("RT1").await.unwrap(), Some(rt));
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.refresh_links, 0);
    assert_eq!(stats.auth_key_entries, 0);
}

async fn cascade_with_unknown_refresh_is_noop(
    store: Arc<dyn TokenStore>,
    _clock: Arc<ManualClock>,
) {
    store
        .store_access_token(&AccessToken::new("AT1"), &ctx("alice"))
        .await
        .unwrap();
    store.store_refresh_token(&RefreshToken::new("RT-unlinked"), &ctx("alice")).await.unwrap();

    store.remove_access_token_using_refresh_token("RT-unknown").await.unwrap();
    store.remove_access_token_using_refresh_token("RT-unlinked").await.unwrap();

    assert!(store.read_access_token("AT1").await.unwrap().is_some());
}

async fn cascade_reaches_tokens_under_other_keys(
    store: Arc<dyn TokenStore>,
    _clock: Arc<ManualClock>,
) {
    let scoped = |scope: &str| {
        AuthenticationContext::new("alice", AuthorizationRequest::new("web-app").with_scope([scope]))
    };
    let (read, write) = (scoped("read"), scoped("write"));
    let rt = RefreshToken::new("RT1");
    store.store_refresh_token(&rt, &read).await.unwrap();
    store
        .store_access_token(&AccessToken::new("AT1").with_refresh(rt.clone()), &read)
        .await
        .unwrap();
    store
        .store_access_token(&AccessToken::new("AT2").with_refresh(rt), &write)
        .await
        .unwrap();
    // Different keys: both tokens stay live until the refresh token goes.
    assert!(store.read_access_token("AT1").await.unwrap().is_some());

    store
        .remove_access_token_using_refresh_token("RT1")
        .await
        .unwrap();
    store.remove_refresh_token("RT1").await.unwrap();

    assert!(store.read_access_token("AT1").await.unwrap().is_none());
    assert!(store.read_access_token("AT2").await.unwrap().is_none());
    assert!(store.get_access_token(&read).await.unwrap().is_none());
    assert!(store.get_access_token(&write).await.unwrap().is_none());
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.access_tokens, 0);
    assert_eq!(stats.auth_key_entries, 0);
    assert_eq!(stats.refresh_links, 0);
}

async fn remove_refresh_token_does_not_cascade(
    store: Arc<dyn TokenStore>,
    _clock: Arc<ManualClock>,
) {
    let rt = RefreshToken::new("RT1");
    store.store_refresh_token(&rt, &ctx("alice")).await.unwrap();
    store
        .store_access_token(&AccessToken::new("AT1").with_refresh(rt), &ctx("alice"))
        .await
        .unwrap();

    store.remove_refresh_token("RT1").await.unwrap();
    store.remove_refresh_token("RT1").await.unwrap();
    assert!(store.read_refresh_token("RT1").await.unwrap().is_none());
    assert!(store.read_access_token("AT1").await.unwrap().is_some());

    // The link survives so the caller can still cascade afterwards.
    store.remove_access_token_using_refresh_token("RT1").await.unwrap();
    assert!(store.read_access_token("AT1").await.unwrap().is_none());
}

async fn refresh_token_roundtrip(store: Arc<dyn TokenStore>, _clock: Arc<ManualClock>) {
    let rt = RefreshToken::expiring("RT1", T0 + 86_400);
    store.store_refresh_token(&rt, &ctx("alice")).await.unwrap();
    assert_eq!(store.read_refresh_token("RT1").await.unwrap(), Some(rt.clone()));
    assert_eq!(
        store.read_authentication_for_refresh_token(&rt).await.unwrap(),
        Some(ctx("alice"))
    );
    // Refresh tokens are never resolvable by authentication key.
    assert!(store.get_access_token(&ctx("alice")).await.unwrap().is_none());
}

async fn expired_access_token_is_absent(store: Arc<dyn TokenStore>, clock: Arc<ManualClock>) {
    let token = AccessToken::new("AT1").with_expires_at(T0 + 60);
    store.store_access_token(&token, &ctx("alice")).await.unwrap();
    assert!(store.read_access_token("AT1").await.unwrap().is_some());

    clock.advance(60);
    assert!(store.get_access_token(&ctx("alice")).await.unwrap().is_none());
    assert!(store.read_access_token("AT1").await.unwrap().is_none());
    assert!(store.read_authentication(&token).await.unwrap().is_none());
    assert!(
        store
            .find_tokens_by_client_id("web-app")
            .await
            .unwrap()
            .is_empty()
    );

    // Lazy eviction removed the record and its key mapping.
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.access_tokens, 0);
    assert_eq!(stats.auth_key_entries, 0);
}

async fn expired_refresh_token_is_absent(store: Arc<dyn TokenStore>, clock: Arc<ManualClock>) {
    let rt = RefreshToken::expiring("RT1", T0 + 10);
    store.store_refresh_token(&rt, &ctx("alice")).await.unwrap();
    clock.set(T0 + 11);
    assert!(store.read_authentication_for_refresh_token(&rt).await.unwrap().is_none());
    assert!(store.read_refresh_token("RT1").await.unwrap().is_none());
    assert_eq!(store.stats().await.unwrap().refresh_tokens, 0);
}

async fn empty_values_are_rejected(store: Arc<dyn TokenStore>, _clock: Arc<ManualClock>) {
    let err = store
        .store_access_token(&AccessToken::new(""), &ctx("alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidToken(_)));
    let err = store
        .store_refresh_token(&RefreshToken::new(""), &ctx("alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidToken(_)));

    // Nothing was partially applied.
    let stats = store.stats().await.unwrap();
    assert_eq!(stats, grantstore_types::StoreStats::default());
}

async fn find_tokens_by_client_and_user(store: Arc<dyn TokenStore>, _clock: Arc<ManualClock>) {
    store
        .store_access_token(&AccessToken::new("AT-alice"), &ctx("alice"))
        .await
        .unwrap();
    store
        .store_access_token(&AccessToken::new("AT-bob"), &ctx("bob"))
        .await
        .unwrap();
    let other = AuthenticationContext::new("alice", AuthorizationRequest::new("cli"));
    store
        .store_access_token(&AccessToken::new("AT-cli"), &other)
        .await
        .unwrap();

    let web: Vec<_> = store
        .find_tokens_by_client_id("web-app")
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.value)
        .collect();
    assert_eq!(web, vec!["AT-alice", "AT-bob"]);

    let alice_web = store
        .find_tokens_by_client_id_and_user_name("web-app", "alice")
        .await
        .unwrap();
    assert_eq!(alice_web.len(), 1);
    assert_eq!(alice_web[0].value, "AT-alice");
    assert!(
        store
            .find_tokens_by_client_id_and_user_name("cli", "bob")
            .await
            .unwrap()
            .is_empty()
    );
}

async fn purge_evicts_expired_records(store: Arc<dyn TokenStore>, clock: Arc<ManualClock>) {
    store
        .store_access_token(
            &AccessToken::new("AT-dead")
                .with_expires_at(T0 + 5)
                .with_refresh(RefreshToken::expiring("RT-dead", T0 + 5)),
            &ctx("alice"),
        )
        .await
        .unwrap();
    store
        .store_refresh_token(&RefreshToken::expiring("RT-dead", T0 + 5), &ctx("alice"))
        .await
        .unwrap();
    store
        .store_access_token(&AccessToken::new("AT-live"), &ctx("bob"))
        .await
        .unwrap();

    clock.advance(5);
    let report = store.purge_expired().await.unwrap();
    assert_eq!(report.access_tokens, 1);
    assert_eq!(report.refresh_tokens, 1);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.access_tokens, 1);
    assert_eq!(stats.refresh_tokens, 0);
    assert_eq!(stats.auth_key_entries, 1);
    assert_eq!(stats.refresh_links, 0);
    assert_eq!(store.purge_expired().await.unwrap().total(), 0);
}

async fn clear_empties_store(store: Arc<dyn TokenStore>, _clock: Arc<ManualClock>) {
    store
        .store_access_token(
            &AccessToken::new("AT1").with_refresh(RefreshToken::new("RT1")),
            &ctx("alice"),
        )
        .await
        .unwrap();
    store.store_refresh_token(&RefreshToken::new("RT1"), &ctx("alice")).await.unwrap();
    store.clear().await.unwrap();
    assert_eq!(
        store.stats().await.unwrap(),
        grantstore_types::StoreStats::default()
    );
}

// ── Concurrency ───────────────────────────────────────────────────────────────

async fn concurrent_stores_leave_one_token(store: Arc<dyn TokenStore>) {
    const N: usize = 32;
    let c1 = ctx("alice");
    // With a token in place before the race, every lookup must resolve:
    // a `None` would mean a reader saw the key mapping without its record.
    store
        .store_access_token(&AccessToken::new("AT-seed"), &c1)
        .await
        .unwrap();

    let writers = (0..N).map(|i| {
        let store = Arc::clone(&store);
        let c1 = c1.clone();
        tokio::spawn(async move {
            let token = AccessToken::new(format!("AT-{i}"))
                .with_refresh(RefreshToken::new(format!("RT-{i}")));
            store.store_access_token(&token, &c1).await.unwrap();
        })
    });
    let readers = (0..N).map(|_| {
        let store = Arc::clone(&store);
        let c1 = c1.clone();
        tokio::spawn(async move {
            for _ in 0..8 {
                let token = store.get_access_token(&c1).await.unwrap();
                assert!(token.is_some_and(|t| t.value.starts_with("AT-")));
                tokio::task::yield_now().await;
            }
        })
    });
    for result in join_all(writers.chain(readers)).await {
        result.unwrap();
    }

    let current = store.get_access_token(&c1).await.unwrap().unwrap();
    let mut live = 0;
    for i in 0..N {
        if store.read_access_token(&format!("AT-{i}")).await.unwrap().is_some() {
            live += 1;
        }
    }
    assert_eq!(live, 1);
    assert_ne!(current.value, "AT-seed");
    assert!(store.read_access_token("AT-seed").await.unwrap().is_none());
    assert!(store.read_access_token(&current.value).await.unwrap().is_some());

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.access_tokens, 1);
    assert_eq!(stats.auth_key_entries, 1);
    assert_eq!(stats.refresh_links, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stores_memory() {
    concurrent_stores_leave_one_token(Arc::new(InMemoryTokenStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stores_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("grants.db").display());
    let store = SqliteTokenStore::new(&url).await.unwrap();
    concurrent_stores_leave_one_token(Arc::new(store)).await;
}

#[tokio::test]
async fn sqlite_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("grants.db").display());
    let token = AccessToken::new("AT1").with_refresh(RefreshToken::new("RT1"));
    {
        let store = SqliteTokenStore::new(&url).await.unwrap();
        store.store_access_token(&token, &ctx("alice")).await.unwrap();
    }
    let store = SqliteTokenStore::new(&url).await.unwrap();
    assert_eq!(store.get_access_token(&ctx("alice")).await.unwrap(), Some(token));
    store.remove_access_token_using_refresh_token("RT1").await.unwrap();
    assert!(store.read_access_token("AT1").await.unwrap().is_none());
}
