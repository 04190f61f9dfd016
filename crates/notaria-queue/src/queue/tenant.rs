use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::domain::{TenantId, TramiteType};
use super::repository::TenantConfigProvider;

/// Admission parameters for one notaría.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_concurrent_sessions: u32,
    pub session_timeout_minutes: u32,
    pub ready_timeout_minutes: u32,
    /// Fallback service-time estimate in minutes.
    pub estimated_time_per_tramite: u32,
    pub enable_priorities: bool,
    pub auto_expire_inactive: bool,
    /// Per-procedure overrides of `estimated_time_per_tramite`.
    pub tramite_estimates: BTreeMap<TramiteType, u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 3,
            session_timeout_minutes: 30,
            ready_timeout_minutes: 10,
            estimated_time_per_tramite: 15,
            enable_priorities: true,
            auto_expire_inactive: true,
            tramite_estimates: BTreeMap::new(),
        }
    }
}

impl QueueConfig {
    pub fn estimate_for(&self, tramite: TramiteType) -> u32 {
        self.tramite_estimates
            .get(&tramite)
            .copied()
            .unwrap_or(self.estimated_time_per_tramite)
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_concurrent_sessions == 0 {
            return Err("max_concurrent_sessions must be at least 1");
        }
        if self.session_timeout_minutes == 0 {
            return Err("session_timeout_minutes must be at least 1");
        }
        if self.ready_timeout_minutes == 0 {
            return Err("ready_timeout_minutes must be at least 1");
        }
        Ok(())
    }
}

/// Hot-reloadable tenant configuration table.
#[derive(Debug, Default)]
pub struct InMemoryTenantConfigs {
    entries: RwLock<HashMap<TenantId, QueueConfig>>,
}

impl InMemoryTenantConfigs {
    pub fn new(entries: impl IntoIterator<Item = (TenantId, QueueConfig)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Replaces (or registers) a tenant's config; takes effect on the next operation.
    pub fn upsert(&self, tenant: TenantId, config: QueueConfig) {
        self.entries
            .write()
            .expect("tenant config lock poisoned")
            .insert(tenant, config);
    }

    pub fn remove(&self, tenant: &TenantId) -> Option<QueueConfig> {
        self.entries
            .write()
            .expect("tenant config lock poisoned")
            .remove(tenant)
    }
}

impl TenantConfigProvider for InMemoryTenantConfigs {
    fn get(&self, tenant: &TenantId) -> Option<QueueConfig> {
        self.entries
            .read()
            .expect("tenant config lock poisoned")
            .get(tenant)
            .cloned()
    }

    fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self
            .entries
            .read()
            .expect("tenant config lock poisoned")
            .keys()
            .cloned()
            .collect();
        tenants.sort();
        tenants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_falls_back_to_default() {
        let mut config = QueueConfig::default();
        config.tramite_estimates.insert(TramiteType::Testamento, 45);
        assert_eq!(config.estimate_for(TramiteType::Testamento), 45);
        assert_eq!(config.estimate_for(TramiteType::Compraventa), 15);
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let config = QueueConfig {
            max_concurrent_sessions: 0,
            ..QueueConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(QueueConfig::default().validate().is_ok());
    }

    #[test]
    fn upsert_replaces_config_and_lists_sorted_tenants() {
        let configs = InMemoryTenantConfigs::new([
            (TenantId::from("notaria-b"), QueueConfig::default()),
            (TenantId::from("notaria-a"), QueueConfig::default()),
        ]);
        configs.upsert(
            TenantId::from("notaria-b"),
            QueueConfig {
                max_concurrent_sessions: 7,
                ..QueueConfig::default()
            },
        );

        assert_eq!(
            configs.tenants(),
            vec![TenantId::from("notaria-a"), TenantId::from("notaria-b")]
        );
        let updated = configs
            .get(&TenantId::from("notaria-b"))
            .expect("tenant present");
        assert_eq!(updated.max_concurrent_sessions, 7);

        configs.remove(&TenantId::from("notaria-a"));
        assert!(configs.get(&TenantId::from("notaria-a")).is_none());
    }
}
