//! Isolation profiles: named bundles of resource, network, and filesystem
//! policy applied at session start.
//!
//! Four canonical tiers ship with the runtime, from most permissive to
//! most locked down:
//!
//! ```text
//! ┌────────────┬──────────────────┬──────────────────┬───────────────────┐
//! │ Tier       │ Resources        │ Network          │ Filesystem        │
//! ├────────────┼──────────────────┼──────────────────┼───────────────────┤
//! │ open       │ 4 cpu / 8G / 40G │ unrestricted     │ home (rw)         │
//! │ balanced   │ 2 cpu / 4G / 20G │ allowlist        │ workspace (rw)    │
//! │ restricted │ 1 cpu / 2G / 10G │ allowlist, tight │ workspace (ro+rw) │
//! │ isolated   │ 1 cpu / 1G / 5G  │ disabled         │ session dir only  │
//! └────────────┴──────────────────┴──────────────────┴───────────────────┘
//! ```
//!
//! A profile is an immutable template: it is chosen at session start and
//! snapshotted into the session. Runtime adjustments go through
//! `IsolationRuntime::update_profile`, which reports rather than silently
//! drops any field that needs a restart to take effect.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Resource caps applied to the isolated environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCaps {
    /// CPU cores available to the environment.
    pub cpu_cores: f64,
    /// Memory cap in gigabytes.
    pub memory_gb: u64,
    /// Disk cap in gigabytes.
    pub disk_gb: u64,
}

/// Network policy for the isolated environment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkPolicy {
    /// Whether the environment gets any network access at all.
    pub enabled: bool,
    /// Hosts explicitly allowed (empty = all, when enabled).
    pub allowed_hosts: Vec<String>,
    /// Hosts explicitly blocked.
    pub blocked_hosts: Vec<String>,
}

/// Filesystem policy for the isolated environment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilesystemPolicy {
    /// Paths mounted read-write.
    pub allowed_paths: Vec<PathBuf>,
    /// Paths that must never be visible inside the environment.
    pub blocked_paths: Vec<PathBuf>,
    /// Paths mounted read-only.
    pub readonly_paths: Vec<PathBuf>,
}

/// A named bundle of isolation policy, chosen at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationProfile {
    /// Profile name (one of the canonical tiers, or a custom label).
    pub name: String,
    /// Resource caps.
    pub resources: ResourceCaps,
    /// Network policy.
    pub network: NetworkPolicy,
    /// Filesystem policy.
    pub filesystem: FilesystemPolicy,
    /// Whether clipboard sharing with the host is permitted.
    pub clipboard: bool,
    /// Whether the environment may use the host GPU.
    pub gpu: bool,
}

impl IsolationProfile {
    /// The most permissive tier: full network, generous caps.
    pub fn open() -> Self {
        Self {
            name: "open".to_string(),
            resources: ResourceCaps {
                cpu_cores: 4.0,
                memory_gb: 8,
                disk_gb: 40,
            },
            network: NetworkPolicy {
                enabled: true,
                allowed_hosts: Vec::new(),
                blocked_hosts: Vec::new(),
            },
            filesystem: FilesystemPolicy {
                allowed_paths: vec![PathBuf::from("/home")],
                blocked_paths: Vec::new(),
                readonly_paths: Vec::new(),
            },
            clipboard: true,
            gpu: true,
        }
    }

    /// The default tier: workspace access, allowlisted network.
    pub fn balanced() -> Self {
        Self {
            name: "balanced".to_string(),
            resources: ResourceCaps {
                cpu_cores: 2.0,
                memory_gb: 4,
                disk_gb: 20,
            },
            network: NetworkPolicy {
                enabled: true,
                allowed_hosts: default_allowed_hosts(),
                blocked_hosts: Vec::new(),
            },
            filesystem: FilesystemPolicy {
                allowed_paths: vec![PathBuf::from("/workspace")],
                blocked_paths: vec![PathBuf::from("/etc"), PathBuf::from("/root")],
                readonly_paths: Vec::new(),
            },
            clipboard: true,
            gpu: false,
        }
    }

    /// A tighter tier: read-only workspace plus a scratch directory.
    pub fn restricted() -> Self {
        Self {
            name: "restricted".to_string(),
            resources: ResourceCaps {
                cpu_cores: 1.0,
                memory_gb: 2,
                disk_gb: 10,
            },
            network: NetworkPolicy {
                enabled: true,
                allowed_hosts: vec!["pypi.org".to_string(), "crates.io".to_string()],
                blocked_hosts: Vec::new(),
            },
            filesystem: FilesystemPolicy {
                allowed_paths: vec![PathBuf::from("/workspace/scratch")],
                blocked_paths: vec![PathBuf::from("/etc"), PathBuf::from("/root")],
                readonly_paths: vec![PathBuf::from("/workspace")],
            },
            clipboard: false,
            gpu: false,
        }
    }

    /// The most locked-down tier: no network, session directory only.
    pub fn isolated() -> Self {
        Self {
            name: "isolated".to_string(),
            resources: ResourceCaps {
                cpu_cores: 1.0,
                memory_gb: 1,
                disk_gb: 5,
            },
            network: NetworkPolicy {
                enabled: false,
                allowed_hosts: Vec::new(),
                blocked_hosts: Vec::new(),
            },
            filesystem: FilesystemPolicy {
                allowed_paths: Vec::new(),
                blocked_paths: vec![PathBuf::from("/")],
                readonly_paths: Vec::new(),
            },
            clipboard: false,
            gpu: false,
        }
    }

    /// Look up a canonical tier by name.
    pub fn for_tier(tier: ProfileTier) -> Self {
        match tier {
            ProfileTier::Open => Self::open(),
            ProfileTier::Balanced => Self::balanced(),
            ProfileTier::Restricted => Self::restricted(),
            ProfileTier::Isolated => Self::isolated(),
        }
    }
}

impl Default for IsolationProfile {
    fn default() -> Self {
        Self::balanced()
    }
}

/// The canonical profile tiers, in decreasing order of openness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileTier {
    Open,
    #[default]
    Balanced,
    Restricted,
    Isolated,
}

impl FromStr for ProfileTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(ProfileTier::Open),
            "balanced" => Ok(ProfileTier::Balanced),
            "restricted" => Ok(ProfileTier::Restricted),
            "isolated" => Ok(ProfileTier::Isolated),
            _ => Err(format!(
                "invalid profile tier '{}', expected 'open', 'balanced', 'restricted', or 'isolated'",
                s
            )),
        }
    }
}

/// Hosts a balanced session may reach: package registries and docs.
pub fn default_allowed_hosts() -> Vec<String> {
    vec![
        "crates.io".to_string(),
        "static.crates.io".to_string(),
        "index.crates.io".to_string(),
        "registry.npmjs.org".to_string(),
        "pypi.org".to_string(),
        "files.pythonhosted.org".to_string(),
        "docs.rs".to_string(),
        "github.com".to_string(),
        "raw.githubusercontent.com".to_string(),
    ]
}

/// A partial profile applied to a running session, best-effort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    /// New resource caps.
    pub resources: Option<ResourceCaps>,
    /// Toggle network access.
    pub network_enabled: Option<bool>,
    /// Replace the allowed-host list.
    pub allowed_hosts: Option<Vec<String>>,
    /// Toggle clipboard sharing.
    pub clipboard: Option<bool>,
    /// Toggle GPU access.
    pub gpu: Option<bool>,
}

impl ProfilePatch {
    /// True when the patch contains no changes.
    pub fn is_empty(&self) -> bool {
        self.resources.is_none()
            && self.network_enabled.is_none()
            && self.allowed_hosts.is_none()
            && self.clipboard.is_none()
            && self.gpu.is_none()
    }
}

/// Outcome of a best-effort profile update.
///
/// Fields that cannot change without a restart are listed rather than
/// silently ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// Fields applied live.
    pub applied: Vec<String>,
    /// Fields that need a session restart to take effect.
    pub requires_restart: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parsing() {
        assert_eq!("open".parse::<ProfileTier>().unwrap(), ProfileTier::Open);
        assert_eq!(
            "Balanced".parse::<ProfileTier>().unwrap(),
            ProfileTier::Balanced
        );
        assert_eq!(
            "isolated".parse::<ProfileTier>().unwrap(),
            ProfileTier::Isolated
        );
        assert!("paranoid".parse::<ProfileTier>().is_err());
    }

    #[test]
    fn test_tiers_strictly_tighten() {
        let tiers = [
            IsolationProfile::open(),
            IsolationProfile::balanced(),
            IsolationProfile::restricted(),
            IsolationProfile::isolated(),
        ];

        for pair in tiers.windows(2) {
            assert!(pair[0].resources.cpu_cores >= pair[1].resources.cpu_cores);
            assert!(pair[0].resources.memory_gb >= pair[1].resources.memory_gb);
            assert!(pair[0].resources.disk_gb > pair[1].resources.disk_gb);
        }

        assert!(tiers[0].network.enabled && tiers[0].network.allowed_hosts.is_empty());
        assert!(!tiers[3].network.enabled);
    }

    #[test]
    fn test_profile_roundtrip() {
        let profile = IsolationProfile::restricted();
        let json = serde_json::to_string(&profile).unwrap();
        let back: IsolationProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(profile, back);
    }

    #[test]
    fn test_empty_patch() {
        assert!(ProfilePatch::default().is_empty());
        let patch = ProfilePatch {
            network_enabled: Some(false),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
