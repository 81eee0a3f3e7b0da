//! Config command handler

use super::load_config;
use crate::error::CliResult;
use crate::ConfigArgs;
use sondar::HarnessConfig;

/// Execute the config command
///
/// # Errors
///
/// Unreadable or invalid configuration.
pub fn execute_config(args: &ConfigArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    print!("{}", render_config(&config)?);
    Ok(())
}

/// Effective configuration as YAML
///
/// # Errors
///
/// Serialization failure.
pub fn render_config(config: &HarnessConfig) -> CliResult<String> {
    Ok(config.to_yaml()?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_render_round_trips_through_loader() {
        let config = HarnessConfig::default().with_retries(1);
        let yaml = render_config(&config).unwrap();
        assert!(yaml.contains("base_url: https://www.mercedes-benz.de"));
        assert!(yaml.contains("token_env: SONDAR_API_TOKEN"));
        assert_eq!(HarnessConfig::from_yaml(&yaml).unwrap(), config);
    }
}
