use anyhow::{Context, Result};
use hunt_engine::HuntConfig;
use std::path::Path;

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Nanosecond timestamp for scratch directory names.
pub fn unique_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// Read a hunt config file, applying a `--levels` override on top.
pub fn load_config(path: Option<&Path>, levels: Option<u32>) -> Result<HuntConfig> {
    let mut config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            HuntConfig::from_json(&json)
                .with_context(|| format!("invalid hunt config in {}", path.display()))?
        }
        None => HuntConfig::default(),
    };
    if let Some(levels) = levels {
        config.total_levels = levels;
    }
    config.validate().context("invalid hunt config")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_filters() {
        let parts = split_csv(" smoke, ,scan-stream,  double-begin ");
        assert_eq!(parts, vec!["smoke", "scan-stream", "double-begin"]);
    }

    #[test]
    fn levels_override_applies_after_file() {
        let path = std::env::temp_dir().join(format!("hunt-config-{}.json", unique_suffix()));
        std::fs::write(&path, r#"{"total_levels": 4, "code_prefixes": ["qr"]}"#).unwrap();
        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.total_levels, 4);
        assert_eq!(config.code_prefixes, vec!["qr"]);
        let config = load_config(Some(&path), Some(9)).unwrap();
        assert_eq!(config.total_levels, 9);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn zero_levels_is_rejected() {
        let err = load_config(None, Some(0)).unwrap_err();
        assert!(format!("{err:#}").contains("total_levels"));
    }
}
