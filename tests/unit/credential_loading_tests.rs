//! Unit tests for classifier API key loading.
//!
//! Covers the env-var fallback, the disabled-classifier short circuit, and
//! the downgrade to local rules when no key is available.
//!
//! NOTE: These tests mutate process-global env vars and must run serially.

use pilot_orchestrator::config::GlobalConfig;

fn make_config(classifier_enabled: bool) -> (tempfile::TempDir, GlobalConfig) {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "project_path = '{}'\n\n[classifier]\nenabled = {classifier_enabled}\n",
        temp.path().to_str().expect("utf8 path")
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");
    (temp, config)
}

/// The key is read from `ANTHROPIC_API_KEY` when the keychain has no entry.
#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn env_var_credential_loading() {
    let (_temp, mut config) = make_config(true);

    // SAFETY: serialized by `serial_test`; no other thread reads the env.
    unsafe {
        std::env::set_var("ANTHROPIC_API_KEY", "sk-test-key");
    }

    config.load_credentials().await.expect("credentials load");

    assert!(config.classifier.enabled);
    assert_eq!(config.classifier.api_key, "sk-test-key");

    unsafe {
        std::env::remove_var("ANTHROPIC_API_KEY");
    }
}

/// A missing key disables the remote classifier instead of failing.
#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn missing_key_disables_remote_classifier() {
    let (_temp, mut config) = make_config(true);

    // SAFETY: serialized by `serial_test`.
    unsafe {
        std::env::remove_var("ANTHROPIC_API_KEY");
    }

    config.load_credentials().await.expect("not fatal");

    assert!(!config.classifier.enabled);
    assert!(config.classifier.api_key.is_empty());
}

/// An empty env var counts as missing.
#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn empty_env_var_counts_as_missing() {
    let (_temp, mut config) = make_config(true);

    // SAFETY: serialized by `serial_test`.
    unsafe {
        std::env::set_var("ANTHROPIC_API_KEY", "");
    }

    config.load_credentials().await.expect("not fatal");
    assert!(!config.classifier.enabled);

    unsafe {
        std::env::remove_var("ANTHROPIC_API_KEY");
    }
}

/// With the classifier disabled no lookup happens at all.
#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn disabled_classifier_skips_lookup() {
    let (_temp, mut config) = make_config(false);

    // SAFETY: serialized by `serial_test`.
    unsafe {
        std::env::set_var("ANTHROPIC_API_KEY", "sk-unused");
    }

    config.load_credentials().await.expect("credentials load");
    assert!(config.classifier.api_key.is_empty());

    unsafe {
        std::env::remove_var("ANTHROPIC_API_KEY");
    }
}
