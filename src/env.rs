//! Deployment identity read from the process environment.
//!
//! Values are loaded once, on first access, and never change afterwards.

use std::sync::OnceLock;

const DEFAULT_REGION: &str = "sh";
const DEFAULT_ZONE: &str = "sh001";
const DEFAULT_DEPLOY_ENV: &str = "dev";
const FALLBACK_HOSTNAME: &str = "localhost";
const HOSTNAME_FILES: [&str; 2] = ["/proc/sys/kernel/hostname", "/etc/hostname"];

/// Where and as what the current process runs
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Env {
    /// Region the application runs in (`REGION`)
    pub region: String,
    /// Availability zone (`ZONE`)
    pub zone: String,
    /// Machine hostname (`HOSTNAME`, else the system hostname)
    pub hostname: String,
    /// Deployment environment such as `dev` or `prod` (`DEPLOY_ENV`)
    pub deploy_env: String,
    /// Globally unique application id (`APP_ID`)
    pub app_id: String,
    /// Experimental group within a cluster (`COLOR`)
    pub color: String,
}

impl Env {
    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        Self {
            region: get("REGION", DEFAULT_REGION),
            zone: get("ZONE", DEFAULT_ZONE),
            hostname: var("HOSTNAME").unwrap_or_else(system_hostname),
            deploy_env: get("DEPLOY_ENV", DEFAULT_DEPLOY_ENV),
            app_id: get("APP_ID", ""),
            color: get("COLOR", ""),
        }
    }

    /// Build from the real process environment
    pub fn from_process() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// The name the kernel reports for this machine, or `localhost`
pub fn system_hostname() -> String {
    HOSTNAME_FILES
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_HOSTNAME.to_string())
}

/// The process-wide snapshot
pub fn current() -> &'static Env {
    static ENV: OnceLock<Env> = OnceLock::new();
    ENV.get_or_init(Env::from_process)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let env = Env::from_lookup(|_| None);
        assert_eq!(env.region, "sh");
        assert_eq!(env.zone, "sh001");
        assert_eq!(env.deploy_env, "dev");
        assert!(env.app_id.is_empty());
        assert_eq!(env.hostname, system_hostname());
        assert!(!env.hostname.is_empty());
    }

    #[test]
    fn test_hostname_variable_wins() {
        let env = Env::from_lookup(|k| (k == "HOSTNAME").then(|| "audit-7f9c".to_string()));
        assert_eq!(env.hostname, "audit-7f9c");
    }

    #[test]
    fn test_lookup_overrides_and_empty_values() {
        let vars: HashMap<&str, &str> = [("APP_ID", "main.arch.audit"), ("ZONE", "")]
            .into_iter()
            .collect();
        let env = Env::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(env.app_id, "main.arch.audit");
        // empty values fall back to the default
        assert_eq!(env.zone, "sh001");
    }

    #[test]
    fn test_current_is_stable() {
        assert!(std::ptr::eq(current(), current()));
    }
}
