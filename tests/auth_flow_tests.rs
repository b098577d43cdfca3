//! End-to-end identity flow through the public API: provisioning, signup, token use,
//! authorization decisions, and fatal escalation.

use std::sync::Arc;
use std::thread;

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use tempfile::tempdir;

use feedgate::error::{AuthError, FatalError, UserError};
use feedgate::identity::{
    decide, load_signing_secret, CredentialManager, Effect, FileSecretStore, RequestAuthenticator, TokenCodec,
    TOKEN_LIFETIME_HOURS,
};
use feedgate::store::MemoryCredentialStore;
use feedgate::users::UserService;

fn provisioned_codec() -> Result<TokenCodec> {
    let dir = tempdir()?;
    std::fs::write(dir.path().join("udagram-jwt.json"), r#"{"jwtSecret":"flow-secret"}"#)?;
    let secret = load_signing_secret(&FileSecretStore::new(dir.path()), "udagram-jwt", "jwtSecret")?;
    Ok(TokenCodec::new(secret))
}

#[test]
fn signup_token_authorizes_feed_access() -> Result<()> {
    let codec = provisioned_codec()?;
    let users = UserService::new(Arc::new(MemoryCredentialStore::new()), CredentialManager::new()?, codec.clone());
    let auth = RequestAuthenticator::new(codec);

    let (_, token) = users.create("a@b.com", "s3cret")?;
    let header = format!("Bearer {}", token);
    let outcome = auth.authenticate_header(Some(&header));
    let decision = decide(&outcome, "/feed");
    assert_eq!(decision.effect(), Effect::Allow);
    assert_eq!(decision.principal_id, "a@b.com");
    assert_eq!(decision.context.get("user").map(String::as_str), Some("a@b.com"));

    assert_eq!(users.login("a@b.com", "wrong").unwrap_err(), UserError::Unauthorized);
    Ok(())
}

#[test]
fn expired_or_missing_tokens_deny() -> Result<()> {
    let codec = provisioned_codec()?;
    let auth = RequestAuthenticator::new(codec.clone());
    let issued = Utc::now() - TimeDelta::hours(TOKEN_LIFETIME_HOURS) - TimeDelta::seconds(1);
    let stale = codec.issue_at("a@b.com", issued)?;

    let outcome = auth.authenticate_header(Some(&format!("Bearer {}", stale)));
    assert_eq!(outcome, Err(AuthError::Expired));
    let d = decide(&outcome, "/feed");
    assert_eq!(d.effect(), Effect::Deny);
    assert!(d.policy_document.is_none());

    let d = decide(&auth.authenticate_header(None), "/feed");
    assert_eq!(d.effect(), Effect::Deny);
    assert!(d.principal_id.is_empty());
    Ok(())
}

#[test]
fn concurrent_verifications_are_independent() -> Result<()> {
    let codec = provisioned_codec()?;
    let auth = RequestAuthenticator::new(codec.clone());
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let auth = auth.clone();
            let codec = codec.clone();
            thread::spawn(move || {
                let email = format!("user{}@example.com", i);
                for _ in 0..50 {
                    let tok = codec.issue(&email).expect("issue");
                    assert_eq!(auth.authenticate_header(Some(&format!("Bearer {}", tok))), Ok(email.clone()));
                    assert_eq!(
                        auth.authenticate_header(Some(&format!("Bearer {}x", tok))),
                        Err(AuthError::InvalidSignature)
                    );
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("worker panicked");
    }
    Ok(())
}

#[tokio::test]
async fn fatal_error_stops_the_server() -> Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let server = tokio::spawn(feedgate::server::serve(listener, axum::Router::new(), rx));
    tx.send(FatalError::HashingFailure("entropy exhausted".into()))?;
    let res = server.await?;
    let err = res.expect_err("server should stop with the fatal error");
    assert!(err.to_string().contains("entropy exhausted"));
    Ok(())
}
