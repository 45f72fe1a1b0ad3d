use serde::Deserialize;

use crate::broker::OverflowPolicy;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub bus: BusSettings,
    pub transport: TransportSettings,
    pub log: LogSettings,
}

/// Where the server binds and which path accepts upgrades.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// Event bus buffering and the topic record updates are published on.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BusSettings {
    pub subscriber_buffer: usize,
    pub overflow_policy: OverflowPolicy,
    pub topic: String,
}

/// Connection limits for the WebSocket host.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TransportSettings {
    pub max_connections: usize,
    pub outbound_buffer: usize,
    pub connection_init_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub bus: Option<PartialBusSettings>,
    pub transport: Option<PartialTransportSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBusSettings {
    pub subscriber_buffer: Option<usize>,
    pub overflow_policy: Option<OverflowPolicy>,
    pub topic: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialTransportSettings {
    pub max_connections: Option<usize>,
    pub outbound_buffer: Option<usize>,
    pub connection_init_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 3001,
                path: "/graphql".to_string(),
            },
            bus: BusSettings {
                subscriber_buffer: 16,
                overflow_policy: OverflowPolicy::Disconnect,
                topic: "TEXT_UPDATED".to_string(),
            },
            transport: TransportSettings {
                max_connections: 1000,
                outbound_buffer: 64,
                connection_init_timeout_ms: 3000,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Overlay the values that were provided on top of `base`.
    pub fn merge_into(self, base: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let bus = self.bus.unwrap_or_default();
        let transport = self.transport.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(base.server.host),
                port: server.port.unwrap_or(base.server.port),
                path: server.path.unwrap_or(base.server.path),
            },
            bus: BusSettings {
                subscriber_buffer: bus.subscriber_buffer.unwrap_or(base.bus.subscriber_buffer),
                overflow_policy: bus.overflow_policy.unwrap_or(base.bus.overflow_policy),
                topic: bus.topic.unwrap_or(base.bus.topic),
            },
            transport: TransportSettings {
                max_connections: transport
                    .max_connections
                    .unwrap_or(base.transport.max_connections),
                outbound_buffer: transport
                    .outbound_buffer
                    .unwrap_or(base.transport.outbound_buffer),
                connection_init_timeout_ms: transport
                    .connection_init_timeout_ms
                    .unwrap_or(base.transport.connection_init_timeout_ms),
            },
            log: LogSettings {
                level: log.level.unwrap_or(base.log.level),
            },
        }
    }
}
