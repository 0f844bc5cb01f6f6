//! Hub discovery environment for child processes.
//!
//! Set before the hub serves so that spawned CLI clients (and agent
//! children) can find the running hub.

use crate::hub::HubConfig;

pub const HUB_SOCKET_ENV: &str = "A2A_HUB_SOCKET";
pub const HUB_URL_ENV: &str = "A2A_HUB_URL";

pub fn set_hub_env(config: &HubConfig) {
    if config.socket.enabled && !config.socket.path.as_os_str().is_empty() {
        std::env::set_var(HUB_SOCKET_ENV, &config.socket.path);
    } else {
        std::env::remove_var(HUB_SOCKET_ENV);
    }

    if config.http.enabled && !config.http.host.is_empty() && config.http.port != 0 {
        std::env::set_var(HUB_URL_ENV, config.base_url());
    } else {
        std::env::remove_var(HUB_URL_ENV);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_http_clears_the_url() {
        let mut config = HubConfig::default();
        set_hub_env(&config);
        assert_eq!(
            std::env::var(HUB_URL_ENV).unwrap(),
            "http://127.0.0.1:8080"
        );
        assert_eq!(
            std::env::var(HUB_SOCKET_ENV).unwrap(),
            "/tmp/a2a-hub.sock"
        );

        config.http.enabled = false;
        set_hub_env(&config);
        assert!(std::env::var(HUB_URL_ENV).is_err());
    }
}
