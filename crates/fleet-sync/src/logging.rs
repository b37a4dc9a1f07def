//! 日志初始化

use tracing_subscriber::EnvFilter;

use crate::config::FleetSyncConfig;

/// 未设置 RUST_LOG 时使用的过滤规则
pub fn default_directive(config: &FleetSyncConfig) -> &'static str {
    if config.debug_mode {
        "fleet_sync=debug"
    } else {
        "fleet_sync=info"
    }
}

/// 安装 fmt subscriber；宿主已安装过 subscriber 时返回 false 且不做任何改动
pub fn init_logging(config: &FleetSyncConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_follows_debug_mode() {
        let config = FleetSyncConfig::builder().debug_mode(true).build();
        assert_eq!(default_directive(&config), "fleet_sync=debug");
        assert_eq!(default_directive(&FleetSyncConfig::default()), "fleet_sync=info");
    }

    #[test]
    fn second_init_is_harmless() {
        let config = FleetSyncConfig::default();
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
