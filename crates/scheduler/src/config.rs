//! Scheduler configuration (YAML + env overrides).

use serde::{Deserialize, Serialize};
use std::path::Path;
use vtime_core::SchedulerError;

/// Env var overriding [`SchedulerConfig::max_dispatches`].
pub const ENV_MAX_DISPATCHES: &str = "VTIME_MAX_DISPATCHES";

/// Tunables for a [`VirtualTimeScheduler`](crate::VirtualTimeScheduler).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Stop a single drive (`start`/`advance_to`) after this many invocations.
    /// `None` drains without limit.
    pub max_dispatches: Option<u64>,
}

impl SchedulerConfig {
    /// Parse from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchedulerError> {
        let cfg: Self =
            serde_yaml::from_str(yaml).map_err(|e| SchedulerError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse from a YAML file.
    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self, SchedulerError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SchedulerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&raw)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, SchedulerError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (env-var name to value).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SchedulerError> {
        if let Some(raw) = lookup(ENV_MAX_DISPATCHES) {
            let raw = raw.trim();
            self.max_dispatches = if raw.is_empty() {
                None
            } else {
                let n = raw.parse::<u64>().map_err(|e| {
                    SchedulerError::Config(format!("{ENV_MAX_DISPATCHES}={raw}: {e}"))
                })?;
                Some(n)
            };
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings no scheduler could honor.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_dispatches == Some(0) {
            return Err(SchedulerError::Config("max_dispatches must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_to_unbounded() {
        let cfg = SchedulerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(cfg, SchedulerConfig::default());
        assert_eq!(cfg.max_dispatches, None);
    }

    #[test]
    fn parses_limit_and_rejects_zero() {
        let cfg = SchedulerConfig::from_yaml_str("max_dispatches: 25").unwrap();
        assert_eq!(cfg.max_dispatches, Some(25));
        let err = SchedulerConfig::from_yaml_str("max_dispatches: 0").unwrap_err();
        assert!(matches!(err, SchedulerError::Config(_)));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(SchedulerConfig::from_yaml_str("max_dispatch: 3").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "max_dispatches: 7").unwrap();
        let cfg = SchedulerConfig::from_yaml_path(f.path()).unwrap();
        assert_eq!(cfg.max_dispatches, Some(7));
        assert!(SchedulerConfig::from_yaml_path(f.path().join("missing")).is_err());
    }

    #[test]
    fn overrides_replace_and_clear() {
        let base = SchedulerConfig { max_dispatches: Some(3) };
        let cfg = base
            .clone()
            .with_overrides(|k| (k == ENV_MAX_DISPATCHES).then(|| "12".to_string()))
            .unwrap();
        assert_eq!(cfg.max_dispatches, Some(12));

        let cleared = base.clone().with_overrides(|_| Some(String::new())).unwrap();
        assert_eq!(cleared.max_dispatches, None);

        let untouched = base.clone().with_overrides(|_| None).unwrap();
        assert_eq!(untouched, base);

        assert!(SchedulerConfig::default().with_overrides(|_| Some("lots".into())).is_err());
    }
}
