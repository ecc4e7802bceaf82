mod common;

use akd_client::error::BlobKind;
use akd_client::{AkdError, Config, KeyResolver, KeySource, TrustOutcome};
use common::*;

fn config(pubkey: Option<&str>, url: bool, allow_url_fallback: bool, accept_unverified: bool) -> Config {
    Config {
        record_name: Some("_akd.example.org".to_string()),
        pubkey: pubkey.map(str::to_string),
        url: url.then(|| "https://keys.example.org/authorized_keys".to_string()),
        allow_url_fallback,
        accept_unverified,
        ..Default::default()
    }
}

fn resolver(config: &Config, lookup: StaticLookup, fetcher: &CountingFetcher) -> KeyResolver {
    KeyResolver::new(config, Box::new(lookup), Box::new(fetcher.clone()))
        .unwrap()
        .at(after_signing())
}

#[tokio::test]
async fn test_verified_akds_record() {
    let fetcher = CountingFetcher::ok("");
    let lookup = StaticLookup::new(["v=akds;k=c3NoLWVkMjU1MTkgQUFBQQ==;s=".to_string()
        + SHORT_KEY_SIG.trim()
        + ";"]);

    let keys = resolver(&config(Some(SIGNER), false, false, false), lookup, &fetcher)
        .resolve()
        .await
        .unwrap();

    assert_eq!(keys.trust, TrustOutcome::Verified);
    assert_eq!(keys.source, KeySource::Dns);
    assert_eq!(keys.text, b"ssh-ed25519 AAAA");
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_verified_multi_line_keys() {
    let fetcher = CountingFetcher::ok("");
    let lookup = StaticLookup::new([
        "unrelated=1".to_string(),
        akds_record(AUTHORIZED_KEYS, AUTHORIZED_KEYS_SIG),
    ]);

    let keys = resolver(&config(Some(SIGNER), false, false, false), lookup, &fetcher)
        .resolve()
        .await
        .unwrap();

    assert_eq!(keys.trust, TrustOutcome::Verified);
    assert_eq!(keys.entries, 2);
    assert_eq!(keys.text, AUTHORIZED_KEYS.as_bytes());
}

#[tokio::test]
async fn test_decoded_abc_fails_key_format() {
    let fetcher = CountingFetcher::ok("");
    let lookup = StaticLookup::new(["v=akd;k=QUJD;", "garbage"]);

    let result = resolver(&config(None, false, false, true), lookup, &fetcher)
        .resolve()
        .await;

    assert!(matches!(result, Err(AkdError::KeyFormatInvalid { line: 1, .. })));
}

#[tokio::test]
async fn test_fallback_not_permitted_makes_no_http_call() {
    let fetcher = CountingFetcher::ok(AUTHORIZED_KEYS);

    let result = resolver(&config(Some(SIGNER), true, false, false), StaticLookup::empty(), &fetcher)
        .resolve()
        .await;

    assert_eq!(
        result,
        Err(AkdError::FallbackNotPermitted(Box::new(AkdError::NoSuitableRecord)))
    );
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_undecodable_signature_not_downgraded() {
    let fetcher = CountingFetcher::ok("");
    let lookup = StaticLookup::new(["v=akds;k=c3NoLWVkMjU1MTkgQUFBQQ==;s=c2l;"]);

    let result = resolver(&config(Some(SIGNER), false, false, false), lookup, &fetcher)
        .resolve()
        .await;

    assert!(matches!(
        result,
        Err(AkdError::BlobDecode {
            blob: BlobKind::Signature,
            ..
        })
    ));
}

#[tokio::test]
async fn test_undecodable_signature_accepted_when_allowed() {
    let fetcher = CountingFetcher::ok("");
    let lookup = StaticLookup::new(["v=akds;k=c3NoLWVkMjU1MTkgQUFBQQ==;s=c2l;"]);

    let keys = resolver(&config(Some(SIGNER), false, false, true), lookup, &fetcher)
        .resolve()
        .await
        .unwrap();
    assert_eq!(keys.trust, TrustOutcome::AcceptedUnverified);
}

#[tokio::test]
async fn test_wrong_signing_key() {
    let fetcher = CountingFetcher::ok("");
    let record = akds_record(AUTHORIZED_KEYS, AUTHORIZED_KEYS_SIG);

    let result = resolver(
        &config(Some(OTHER), false, false, false),
        StaticLookup::new([record.clone()]),
        &fetcher,
    )
    .resolve()
    .await;
    assert!(matches!(result, Err(AkdError::SignatureInvalid(_))));

    let keys = resolver(
        &config(Some(OTHER), false, false, true),
        StaticLookup::new([record]),
        &fetcher,
    )
    .resolve()
    .await
    .unwrap();
    assert_eq!(keys.trust, TrustOutcome::AcceptedUnverified);
}

#[tokio::test]
async fn test_tampered_keys_fall_back_to_url() {
    let fetcher = CountingFetcher::ok(AUTHORIZED_KEYS);
    let tampered = AUTHORIZED_KEYS.replace("alice", "mallory");
    let lookup = StaticLookup::new([akds_record(&tampered, AUTHORIZED_KEYS_SIG)]);

    let keys = resolver(&config(Some(SIGNER), true, true, false), lookup, &fetcher)
        .resolve()
        .await
        .unwrap();

    assert_eq!(keys.source, KeySource::Url);
    assert_eq!(keys.trust, TrustOutcome::AcceptedUnverified);
    assert_eq!(keys.text, AUTHORIZED_KEYS.as_bytes());
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_akds_without_configured_key() {
    let fetcher = CountingFetcher::ok("");
    let lookup = StaticLookup::new([akds_record(AUTHORIZED_KEYS, AUTHORIZED_KEYS_SIG)]);

    let result = resolver(&config(None, false, false, false), lookup, &fetcher)
        .resolve()
        .await;
    assert!(matches!(result, Err(AkdError::SignatureInvalid(_))));
}

#[tokio::test]
async fn test_unsigned_record_with_url_fallback() {
    // Trust is decided per source: a rejected AKD record does not block the URL
    let fetcher = CountingFetcher::ok(AUTHORIZED_KEYS);
    let lookup = StaticLookup::new([akd_record(AUTHORIZED_KEYS)]);

    let keys = resolver(&config(Some(SIGNER), true, true, false), lookup, &fetcher)
        .resolve()
        .await
        .unwrap();
    assert_eq!(keys.source, KeySource::Url);
}

#[tokio::test]
async fn test_fallback_fetch_failure() {
    let fetcher = CountingFetcher::failing("HTTP error 503: Service Unavailable");

    let result = resolver(&config(Some(SIGNER), true, true, false), StaticLookup::empty(), &fetcher)
        .resolve()
        .await;
    assert!(matches!(result, Err(AkdError::Fetch(_))));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_first_well_formed_record_wins() {
    let fetcher = CountingFetcher::ok("");
    // The first parseable record is unsigned and rejected; the signed one after it is never tried
    let lookup = StaticLookup::new([
        akd_record(AUTHORIZED_KEYS),
        akds_record(AUTHORIZED_KEYS, AUTHORIZED_KEYS_SIG),
    ]);

    let result = resolver(&config(Some(SIGNER), false, false, false), lookup, &fetcher)
        .resolve()
        .await;
    assert_eq!(result, Err(AkdError::AkdRequiresUnverifiedAcceptance));
}

#[test]
fn test_invalid_pubkey_rejected_at_construction() {
    let fetcher = CountingFetcher::ok("");
    let result = KeyResolver::new(
        &config(Some("-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n-----END PGP PUBLIC KEY BLOCK-----\n"), false, false, false),
        Box::new(StaticLookup::empty()),
        Box::new(fetcher),
    );
    assert!(matches!(result, Err(akd_client::ConfigError::InvalidPublicKey(_))));
}
