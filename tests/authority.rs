use futures::future::join_all;
use std::sync::Arc;
use tokenauth::{
    authority::Authority,
    claims::{now, Timestamp},
    config::Config,
    error::{AuthError, ErrorClass},
    permission::{Permission, PermissionTable, CREATE_ACCOUNT, DELETE_ACCOUNT, NONE, READ_ACCOUNT},
    store::{secret_key, MemoryStore, SecretStore},
};
use tokio_util::sync::CancellationToken;

fn setup() -> (Arc<MemoryStore>, Authority) {
    let store = Arc::new(MemoryStore::new());
    let authority = Authority::new(store.clone(), Arc::new(Config::default())).unwrap();
    (store, authority)
}

fn an_hour_ago() -> Timestamp {
    now() - 3600
}

/// Replace the first character of the signature segment.
fn tamper(token: &str) -> String {
    let (rest, signature) = token.rsplit_once('.').unwrap();
    let mut chars: Vec<char> = signature.chars().collect();
    chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
    format!("{}.{}", rest, chars.into_iter().collect::<String>())
}

#[tokio::test]
async fn verify_matches_has_all() {
    let (_, auth) = setup();
    let cancel = CancellationToken::new();
    let sets = [NONE, CREATE_ACCOUNT, CREATE_ACCOUNT | READ_ACCOUNT, DELETE_ACCOUNT];
    for granted in sets {
        let token = auth.issue("u1", granted, &cancel).await.unwrap();
        for required in sets {
            assert_eq!(
                auth.verify(&token, required, &cancel).await.unwrap(),
                granted.has_all(required),
                "granted {} required {}", granted, required,
            );
        }
    }
}

#[tokio::test]
async fn scenario_permission_subset() {
    let (_, auth) = setup();
    let cancel = CancellationToken::new();
    let token = auth.issue("u1", CREATE_ACCOUNT, &cancel).await.unwrap();
    assert!(auth.verify(&token, CREATE_ACCOUNT, &cancel).await.unwrap());
    assert!(!auth.verify(&token, CREATE_ACCOUNT | DELETE_ACCOUNT, &cancel).await.unwrap());
}

#[tokio::test]
async fn scenario_revocation_is_absolute() {
    let (_, auth) = setup();
    let cancel = CancellationToken::new();
    let token = auth.issue("u1", CREATE_ACCOUNT, &cancel).await.unwrap();
    auth.revoke(&token, &cancel).await.unwrap();
    let err = auth.verify(&token, NONE, &cancel).await.unwrap_err();
    assert_eq!(err, AuthError::UnknownSubject);
}

#[tokio::test]
async fn revoke_invalidates_every_session() {
    let (_, auth) = setup();
    let cancel = CancellationToken::new();
    let first = auth.issue("u1", CREATE_ACCOUNT, &cancel).await.unwrap();
    let second = auth.issue("u1", READ_ACCOUNT, &cancel).await.unwrap();
    let other = auth.issue("u2", READ_ACCOUNT, &cancel).await.unwrap();
    auth.revoke(&second, &cancel).await.unwrap();
    for token in [&first, &second] {
        assert!(auth.verify(token, NONE, &cancel).await.is_err());
    }
    assert!(auth.verify(&other, READ_ACCOUNT, &cancel).await.unwrap());
}

#[tokio::test]
async fn reissue_after_revoke_uses_new_secret() {
    let (_, auth) = setup();
    let cancel = CancellationToken::new();
    let old = auth.issue("u1", CREATE_ACCOUNT, &cancel).await.unwrap();
    auth.revoke_subject("u1", &cancel).await.unwrap();
    let new = auth.issue("u1", CREATE_ACCOUNT, &cancel).await.unwrap();
    assert!(auth.verify(&new, CREATE_ACCOUNT, &cancel).await.unwrap());
    assert_eq!(auth.verify(&old, NONE, &cancel).await, Err(AuthError::BadSignature));
}

#[tokio::test]
async fn expired_is_not_bad_signature() {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(Config::default());
    let backdated = Authority::new(store.clone(), config.clone()).unwrap().with_clock(an_hour_ago);
    let auth = Authority::new(store, config).unwrap();
    let cancel = CancellationToken::new();
    let token = backdated.issue("u1", CREATE_ACCOUNT, &cancel).await.unwrap();
    let err = auth.verify(&token, CREATE_ACCOUNT, &cancel).await.unwrap_err();
    assert_eq!(err, AuthError::Expired);
    assert_eq!(err.class(), ErrorClass::Temporal);
}

#[tokio::test]
async fn expired_tokens_can_still_revoke() {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(Config::default());
    let backdated = Authority::new(store.clone(), config.clone()).unwrap().with_clock(an_hour_ago);
    let auth = Authority::new(store.clone(), config).unwrap();
    let cancel = CancellationToken::new();
    let expired = backdated.issue("u1", CREATE_ACCOUNT, &cancel).await.unwrap();
    let live = auth.issue("u1", CREATE_ACCOUNT, &cancel).await.unwrap();
    auth.revoke(&expired, &cancel).await.unwrap();
    assert!(store.get(&[secret_key("u1")]).await.unwrap().is_empty());
    assert!(auth.verify(&live, NONE, &cancel).await.is_err());
}

#[tokio::test]
async fn scenario_tampered_signature() {
    let (_, auth) = setup();
    let cancel = CancellationToken::new();
    let token = auth.issue("u1", CREATE_ACCOUNT, &cancel).await.unwrap();
    let err = auth.verify(&tamper(&token), CREATE_ACCOUNT, &cancel).await.unwrap_err();
    assert_eq!(err, AuthError::BadSignature);
}

#[tokio::test]
async fn malformed_tokens_fail_closed() {
    let (_, auth) = setup();
    let cancel = CancellationToken::new();
    for token in ["", "garbage", "a.b.c", "a.b.c.d"] {
        let err = auth.verify(token, NONE, &cancel).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Input, "{}", token);
    }
}

#[test]
fn scenario_unrecognized_permission() {
    let table = PermissionTable::standard();
    let err = table.resolve(&["create_account", "bogus"], false).unwrap_err();
    assert_eq!(err, AuthError::UnrecognizedPermission("bogus".into()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_issue_creates_one_secret() {
    let (store, auth) = setup();
    let auth = Arc::new(auth);
    let issues = (0..32).map(|_| {
        let auth = Arc::clone(&auth);
        tokio::spawn(async move {
            auth.issue("fresh", CREATE_ACCOUNT, &CancellationToken::new()).await
        })
    });
    let tokens: Vec<String> = join_all(issues).await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();
    assert_eq!(store.len().await, 1);
    let cancel = CancellationToken::new();
    for token in &tokens {
        assert!(auth.verify(token, CREATE_ACCOUNT, &cancel).await.unwrap());
    }
}

#[tokio::test]
async fn empty_requirement_is_satisfied() {
    let (_, auth) = setup();
    let cancel = CancellationToken::new();
    let token = auth.issue("u1", NONE, &cancel).await.unwrap();
    assert!(auth.verify(&token, Permission::default(), &cancel).await.unwrap());
}
