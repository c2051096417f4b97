//! Capability Registry
//!
//! Detects which analysis backends are usable in the current environment.
//! Probes only check for feature existence and never invoke a backend. A
//! probe that cannot decide reports `false`.
//!
//! Readers get an `Arc<Capabilities>` snapshot. A read that finds the stored
//! snapshot older than the refresh interval re-probes first, so no caller
//! ever sees a stale value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use undertone_common::config::{GenerativeConfig, RemoteConfig, UndertoneConfig};
use undertone_common::lexicon;

/// Set to any value to treat the network as unavailable
pub const OFFLINE_ENV_VAR: &str = "UNDERTONE_OFFLINE";

/// Shortest period the background refresh loop will tick at
pub const MIN_REFRESH_PERIOD: Duration = Duration::from_secs(1);

/// Set to any value to hide the on-device generative backend
pub const DISABLE_GENERATIVE_ENV_VAR: &str = "UNDERTONE_DISABLE_GENERATIVE";

// ============================================================================
// Capabilities
// ============================================================================

/// Snapshot of usable backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub on_device_generative: bool,
    /// Local heuristic lexicons are loaded
    pub local_model: bool,
    pub network_available: bool,
    /// A remote enhancement endpoint is configured
    pub remote_enhanced: bool,
    pub refreshed_at: DateTime<Utc>,
}

impl Capabilities {
    /// Nothing available
    pub fn none() -> Self {
        Self {
            on_device_generative: false,
            local_model: false,
            network_available: false,
            remote_enhanced: false,
            refreshed_at: Utc::now(),
        }
    }

    /// Everything available
    pub fn all() -> Self {
        Self {
            on_device_generative: true,
            local_model: true,
            network_available: true,
            remote_enhanced: true,
            refreshed_at: Utc::now(),
        }
    }

    /// Remote backend is configured and the network is up
    pub fn remote_reachable(&self) -> bool {
        self.remote_enhanced && self.network_available
    }

    pub fn flags(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("onDeviceGenerative", self.on_device_generative),
            ("localModel", self.local_model),
            ("networkAvailable", self.network_available),
            ("remoteEnhanced", self.remote_enhanced),
        ])
    }
}

// ============================================================================
// Probes
// ============================================================================

/// Feature-existence probe. Must be synchronous and side-effect-free.
pub trait CapabilityProbe: Send + Sync {
    fn detect(&self) -> Capabilities;
}

/// Probe driven by configuration and environment variables
#[derive(Debug, Clone)]
pub struct EnvironmentProbe {
    generative: GenerativeConfig,
    heuristic_enabled: bool,
    remote: RemoteConfig,
}

impl EnvironmentProbe {
    pub fn from_config(config: &UndertoneConfig) -> Self {
        Self {
            generative: config.generative.clone(),
            heuristic_enabled: config.heuristic.enabled,
            remote: config.remote.clone(),
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    match reqwest::Url::parse(raw.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
        Err(_) => false,
    }
}

fn env_flag_set(name: &str) -> bool {
    std::env::var_os(name).is_some()
}

impl CapabilityProbe for EnvironmentProbe {
    fn detect(&self) -> Capabilities {
        Capabilities {
            on_device_generative: self.generative.enabled
                && is_http_url(&self.generative.endpoint)
                && !env_flag_set(DISABLE_GENERATIVE_ENV_VAR),
            local_model: self.heuristic_enabled && lexicon::loaded_term_count() > 0,
            network_available: !self.remote.offline && !env_flag_set(OFFLINE_ENV_VAR),
            remote_enhanced: self.remote.is_configured() && is_http_url(&self.remote.endpoint),
            refreshed_at: Utc::now(),
        }
    }
}

/// Fixed flags, for tests and embedding. Counts how often it was probed.
#[derive(Debug)]
pub struct StaticProbe {
    template: Capabilities,
    calls: AtomicUsize,
}

impl StaticProbe {
    pub fn new(template: Capabilities) -> Self {
        Self {
            template,
            calls: AtomicUsize::new(0),
        }
    }

    /// Only the local heuristic
    pub fn local_only() -> Self {
        Self::new(Capabilities {
            local_model: true,
            ..Capabilities::none()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CapabilityProbe for StaticProbe {
    fn detect(&self) -> Capabilities {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Capabilities {
            refreshed_at: Utc::now(),
            ..self.template.clone()
        }
    }
}

impl<P: CapabilityProbe + ?Sized> CapabilityProbe for Arc<P> {
    fn detect(&self) -> Capabilities {
        (**self).detect()
    }
}

impl<P: CapabilityProbe + ?Sized> CapabilityProbe for Box<P> {
    fn detect(&self) -> Capabilities {
        (**self).detect()
    }
}

// ============================================================================
// Registry
// ============================================================================

struct Stored {
    snapshot: Arc<Capabilities>,
    probed_at: Instant,
}

/// Owns the capability snapshot; everything else reads it
pub struct CapabilityRegistry {
    probe: Box<dyn CapabilityProbe>,
    refresh_interval: Duration,
    stored: RwLock<Stored>,
}

impl CapabilityRegistry {
    pub fn new(probe: impl CapabilityProbe + 'static, refresh_interval: Duration) -> Self {
        let snapshot = Arc::new(probe.detect());
        debug!(flags = ?snapshot.flags(), "Initial capability snapshot");
        Self {
            probe: Box::new(probe),
            refresh_interval,
            stored: RwLock::new(Stored {
                snapshot,
                probed_at: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &UndertoneConfig) -> Self {
        Self::new(
            EnvironmentProbe::from_config(config),
            Duration::from_secs(config.registry.effective_refresh_interval()),
        )
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Latest snapshot, re-probing first if the stored one is too old
    pub fn snapshot(&self) -> Arc<Capabilities> {
        {
            let stored = match self.stored.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if stored.probed_at.elapsed() < self.refresh_interval {
                return Arc::clone(&stored.snapshot);
            }
        }
        self.refresh()
    }

    /// Re-probe and replace the stored snapshot
    pub fn refresh(&self) -> Arc<Capabilities> {
        let fresh = Arc::new(self.probe.detect());
        let mut stored = match self.stored.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if stored.snapshot.flags() != fresh.flags() {
            info!(
                before = ?stored.snapshot.flags(),
                after = ?fresh.flags(),
                "Capabilities changed"
            );
        }
        stored.snapshot = Arc::clone(&fresh);
        stored.probed_at = Instant::now();
        fresh
    }

    /// Refresh on the configured interval until cancelled. The period never
    /// drops below [`MIN_REFRESH_PERIOD`].
    pub async fn run_refresh_loop(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.refresh_interval.max(MIN_REFRESH_PERIOD);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the constructor already probed.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Capability refresh loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.refresh();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_local_only() {
        let probe = EnvironmentProbe::from_config(&UndertoneConfig::default());
        let caps = probe.detect();
        assert!(!caps.on_device_generative);
        assert!(caps.local_model);
        assert!(!caps.remote_enhanced);
        assert!(!caps.remote_reachable());
    }

    #[test]
    fn test_bad_endpoints_fail_closed() {
        let mut config = UndertoneConfig::default();
        config.generative.enabled = true;
        config.generative.endpoint = "not a url".into();
        config.remote.enabled = true;
        config.remote.endpoint = "ftp://example.net".into();
        let caps = EnvironmentProbe::from_config(&config).detect();
        assert!(!caps.on_device_generative);
        assert!(!caps.remote_enhanced);
    }

    #[test]
    fn test_configured_remote_detected() {
        let mut config = UndertoneConfig::default();
        config.remote.enabled = true;
        config.remote.endpoint = "https://enhance.example.net/v1/analyze".into();
        let caps = EnvironmentProbe::from_config(&config).detect();
        assert!(caps.remote_enhanced);
    }

    #[test]
    fn test_offline_config_disables_network() {
        let mut config = UndertoneConfig::default();
        config.remote.offline = true;
        let caps = EnvironmentProbe::from_config(&config).detect();
        assert!(!caps.network_available);
    }

    #[test]
    fn test_fresh_snapshot_is_cached() {
        let probe = Arc::new(StaticProbe::local_only());
        let registry = CapabilityRegistry::new(Arc::clone(&probe), Duration::from_secs(60));
        let a = registry.snapshot();
        let b = registry.snapshot();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(probe.calls(), 1);
    }

    #[test]
    fn test_stale_snapshot_is_reprobed() {
        let probe = Arc::new(StaticProbe::local_only());
        let registry = CapabilityRegistry::new(Arc::clone(&probe), Duration::ZERO);
        registry.snapshot();
        registry.snapshot();
        assert_eq!(probe.calls(), 3);
    }

    #[test]
    fn test_explicit_refresh_replaces_snapshot() {
        let probe = Arc::new(StaticProbe::new(Capabilities::all()));
        let registry = CapabilityRegistry::new(Arc::clone(&probe), Duration::from_secs(60));
        let before = registry.snapshot();
        let after = registry.refresh();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&after, &registry.snapshot()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_ticks_until_cancelled() {
        let probe = Arc::new(StaticProbe::local_only());
        let registry = Arc::new(CapabilityRegistry::new(
            Arc::clone(&probe),
            Duration::from_secs(60),
        ));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&registry).run_refresh_loop(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(125)).await;
        cancel.cancel();
        task.await.unwrap();

        // constructor + ticks at 60s and 120s
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_with_zero_interval_uses_minimum_period() {
        let detector = Arc::new(StaticProbe::local_only());
        let registry = Arc::new(CapabilityRegistry::new(Arc::clone(&detector), Duration::ZERO));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&registry).run_refresh_loop(cancel.clone()));

        tokio::time::sleep(MIN_REFRESH_PERIOD * 2 + Duration::from_millis(500)).await;
        cancel.cancel();
        task.await.unwrap();

        // constructor + ticks at 1s and 2s
        assert_eq!(detector.calls(), 3);
    }
}
