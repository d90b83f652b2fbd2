use chem_cash::{AppConfig, config::Env};
use serial_test::serial;
use std::{env, panic, time::Duration};

// --- Setup/Teardown Utilities ---

/// Utility to run a test function and restore environment variables afterward
fn run_with_env<T, R>(test: T, cleanup_vars: Vec<&'static str>) -> R
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    // Save current environment variables
    let originals: Vec<(String, Option<String>)> = cleanup_vars
        .iter()
        .map(|&var| (var.to_string(), env::var(var).ok()))
        .collect();

    // Run the test
    let result = panic::catch_unwind(test);

    // Restore original environment variables
    for (key, original_value) in originals.into_iter().rev() {
        unsafe {
            if let Some(val) = original_value {
                env::set_var(&key, val);
            } else {
                env::remove_var(&key);
            }
        }
    }

    // Re-panic if the test failed
    match result {
        Ok(value) => value,
        Err(e) => panic::resume_unwind(e),
    }
}

// --- Tests ---

#[test]
#[serial]
fn test_app_config_production_fail_fast() {
    // We expect this to panic because the production secrets are not set
    let result = panic::catch_unwind(|| {
        unsafe {
            env::set_var("APP_ENV", "production");
            env::set_var("SUPABASE_URL", "http://fake-url.com");
            // SUPABASE_JWT_SECRET is deliberately missing
            env::remove_var("SUPABASE_JWT_SECRET");
        }
        AppConfig::load()
    });

    // Cleanup
    let cleanup_vars = vec![
        "APP_ENV",
        "SUPABASE_URL",
        "SUPABASE_ANON_KEY",
        "SUPABASE_SERVICE_ROLE_KEY",
        "SUPABASE_JWT_SECRET",
    ];

    unsafe {
        for var in cleanup_vars {
            env::remove_var(var);
        }
    }

    // Assert that the config loading failed (panicked)
    assert!(
        result.is_err(),
        "Production config loading should panic on missing secrets"
    );
}

#[test]
#[serial]
fn test_app_config_local_env_defaults() {
    // Local mode should not panic, and should use hardcoded defaults
    let config = run_with_env(
        || {
            unsafe {
                env::set_var("APP_ENV", "local");
                // Clear other variables to test fallbacks
                env::remove_var("SUPABASE_URL");
                env::remove_var("SUPABASE_ANON_KEY");
                env::remove_var("SUPABASE_SERVICE_ROLE_KEY");
                env::remove_var("SUPABASE_JWT_SECRET");
                env::remove_var("PROFILE_CACHE_TTL_SECS");
            }
            AppConfig::load()
        },
        vec![
            "APP_ENV",
            "SUPABASE_URL",
            "SUPABASE_ANON_KEY",
            "SUPABASE_SERVICE_ROLE_KEY",
            "SUPABASE_JWT_SECRET",
            "PROFILE_CACHE_TTL_SECS",
        ],
    );

    assert_eq!(config.env, Env::Local);
    // Check the Supabase CLI stack default
    assert_eq!(config.supabase_url, "http://localhost:54321");
    // Check local JWT secret fallback
    assert_eq!(config.jwt_secret, "super-secure-test-secret-value-local");
    // The profile cache falls back to its 5-minute freshness bound
    assert_eq!(config.profile_cache_ttl_secs, 300);
}

#[test]
#[serial]
fn test_profile_cache_ttl_override() {
    let config = run_with_env(
        || {
            unsafe {
                env::set_var("APP_ENV", "local");
                env::set_var("PROFILE_CACHE_TTL_SECS", "60");
            }
            AppConfig::load()
        },
        vec!["APP_ENV", "PROFILE_CACHE_TTL_SECS"],
    );

    assert_eq!(config.profile_cache_ttl_secs, 60);
    assert_eq!(config.profile_cache_ttl(), Duration::from_secs(60));
}

#[test]
#[serial]
fn test_profile_cache_ttl_ignores_garbage() {
    let config = run_with_env(
        || {
            unsafe {
                env::set_var("APP_ENV", "local");
                env::set_var("PROFILE_CACHE_TTL_SECS", "soon");
            }
            AppConfig::load()
        },
        vec!["APP_ENV", "PROFILE_CACHE_TTL_SECS"],
    );

    assert_eq!(config.profile_cache_ttl_secs, 300);
}
