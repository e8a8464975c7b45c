//! TOML-based configuration for the node.
//!
//! Reads `NodeConfig` from an explicit path (`--config`) or from the
//! platform-appropriate config file:
//! - Windows:  `%APPDATA%\P2PEcho\config.toml`
//! - Linux:    `~/.config/p2pecho/config.toml`
//! - macOS:    `~/Library/Application Support/P2PEcho/config.toml`
//!
//! A missing file is not an error: the node runs on defaults.
//!
//! ```toml
//! [node]
//! log_level = "info"
//! interface = "wlan0"
//!
//! [p2p]
//! go_intent = 15          # 15 = prefer group owner, 0 = prefer client
//! target_peer_mac = ""    # empty = strongest signal
//! frequency = 2437
//!
//! [network]
//! go_address = "192.168.7.1"
//!
//! [echo]
//! port = 5001
//! count = 10
//! ```
//!
//! Every field carries `#[serde(default = "...")]`, so a file only needs the
//! values it changes.  Timing fields are in milliseconds unless the name
//! says otherwise.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use p2p_core::domain::peer::DEFAULT_MAX_PEERS;
use p2p_core::protocol::MIN_PACKET_SIZE;
use p2p_core::{GoIntent, PeerFilter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::orchestrator::PairingConfig;
use crate::infrastructure::echo::{EchoSettings, MAX_DATAGRAM};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub p2p: P2pSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub echo: EchoSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// P2P network interface name.
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Device name advertised during discovery.
    #[serde(default = "default_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct P2pSection {
    #[serde(default = "default_discovery_timeout_s")]
    pub discovery_timeout_s: u64,
    #[serde(default = "default_discovery_wait_ms")]
    pub discovery_wait_ms: u64,
    #[serde(default = "default_find_stop_delay_ms")]
    pub find_stop_delay_ms: u64,
    #[serde(default = "default_go_neg_request_wait_ms")]
    pub go_neg_request_wait_ms: u64,
    #[serde(default = "default_group_formation_timeout_ms")]
    pub group_formation_timeout_ms: u64,
    #[serde(default = "default_ap_sta_connected_timeout_ms")]
    pub ap_sta_connected_timeout_ms: u64,
    #[serde(default = "default_handshake_wait_ms")]
    pub handshake_wait_ms: u64,
    #[serde(default)]
    pub dhcp_start_delay_ms: u64,
    #[serde(default = "default_client_connect_delay_ms")]
    pub client_connect_delay_ms: u64,
    /// 0..=15.
    #[serde(default = "default_go_intent")]
    pub go_intent: u8,
    /// Peer to connect to; empty picks the strongest signal.
    #[serde(default)]
    pub target_peer_mac: String,
    /// Operating channel in MHz; 0 lets the radio choose.
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    #[serde(default = "default_go_address")]
    pub go_address: Ipv4Addr,
    #[serde(default = "default_netmask")]
    pub netmask: Ipv4Addr,
    #[serde(default = "default_pool_start")]
    pub pool_start: Ipv4Addr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EchoSection {
    #[serde(default = "default_echo_port")]
    pub port: u16,
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// 0 = run until stopped.
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_interface() -> String {
    "wlan0".to_string()
}
fn default_name() -> String {
    "p2p-echo".to_string()
}
fn default_discovery_timeout_s() -> u64 {
    30
}
fn default_discovery_wait_ms() -> u64 {
    10_000
}
fn default_find_stop_delay_ms() -> u64 {
    500
}
fn default_go_neg_request_wait_ms() -> u64 {
    2_000
}
fn default_group_formation_timeout_ms() -> u64 {
    30_000
}
fn default_ap_sta_connected_timeout_ms() -> u64 {
    10_000
}
fn default_handshake_wait_ms() -> u64 {
    2_000
}
fn default_client_connect_delay_ms() -> u64 {
    2_000
}
fn default_go_intent() -> u8 {
    GoIntent::MAX.value()
}
fn default_frequency() -> u32 {
    2437
}
fn default_max_peers() -> usize {
    DEFAULT_MAX_PEERS
}
fn default_go_address() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 7, 1)
}
fn default_netmask() -> Ipv4Addr {
    Ipv4Addr::new(255, 255, 255, 0)
}
fn default_pool_start() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 7, 10)
}
fn default_echo_port() -> u16 {
    5001
}
fn default_packet_size() -> usize {
    64
}
fn default_interval_ms() -> u64 {
    1_000
}
fn default_count() -> u32 {
    10
}
fn default_recv_timeout_ms() -> u64 {
    2_000
}
fn default_stop_grace_ms() -> u64 {
    2_500
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            interface: default_interface(),
            name: default_name(),
        }
    }
}

impl Default for P2pSection {
    fn default() -> Self {
        Self {
            discovery_timeout_s: default_discovery_timeout_s(),
            discovery_wait_ms: default_discovery_wait_ms(),
            find_stop_delay_ms: default_find_stop_delay_ms(),
            go_neg_request_wait_ms: default_go_neg_request_wait_ms(),
            group_formation_timeout_ms: default_group_formation_timeout_ms(),
            ap_sta_connected_timeout_ms: default_ap_sta_connected_timeout_ms(),
            handshake_wait_ms: default_handshake_wait_ms(),
            dhcp_start_delay_ms: 0,
            client_connect_delay_ms: default_client_connect_delay_ms(),
            go_intent: default_go_intent(),
            target_peer_mac: String::new(),
            frequency: default_frequency(),
            max_peers: default_max_peers(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            go_address: default_go_address(),
            netmask: default_netmask(),
            pool_start: default_pool_start(),
        }
    }
}

impl Default for EchoSection {
    fn default() -> Self {
        Self {
            port: default_echo_port(),
            packet_size: default_packet_size(),
            interval_ms: default_interval_ms(),
            count: default_count(),
            recv_timeout_ms: default_recv_timeout_ms(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

// ── Conversion ────────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        GoIntent::new(self.p2p.go_intent)
            .map_err(|e| ConfigError::Invalid(format!("p2p.go_intent: {e}")))?;
        PeerFilter::from_config(&self.p2p.target_peer_mac)
            .map_err(|e| ConfigError::Invalid(format!("p2p.target_peer_mac: {e}")))?;
        if self.p2p.max_peers == 0 {
            return Err(ConfigError::Invalid("p2p.max_peers must be at least 1".into()));
        }
        if self.echo.packet_size < MIN_PACKET_SIZE {
            return Err(ConfigError::Invalid(format!(
                "echo.packet_size must be at least {MIN_PACKET_SIZE} bytes"
            )));
        }
        if self.echo.packet_size > MAX_DATAGRAM {
            return Err(ConfigError::Invalid(format!(
                "echo.packet_size must be at most {MAX_DATAGRAM} bytes"
            )));
        }
        if self.echo.stop_grace_ms < self.echo.recv_timeout_ms {
            return Err(ConfigError::Invalid(
                "echo.stop_grace_ms must not be shorter than echo.recv_timeout_ms".into(),
            ));
        }
        Ok(())
    }

    /// Builds the orchestrator parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when validation fails.
    pub fn pairing_config(&self) -> Result<PairingConfig, ConfigError> {
        self.validate()?;
        let p2p = &self.p2p;
        let ms = Duration::from_millis;

        Ok(PairingConfig {
            interface: self.node.interface.clone(),
            discovery_timeout: Duration::from_secs(p2p.discovery_timeout_s),
            discovery_wait: ms(p2p.discovery_wait_ms),
            find_stop_delay: ms(p2p.find_stop_delay_ms),
            go_neg_request_wait: ms(p2p.go_neg_request_wait_ms),
            group_formation_timeout: ms(p2p.group_formation_timeout_ms),
            ap_sta_connected_timeout: ms(p2p.ap_sta_connected_timeout_ms),
            handshake_wait: ms(p2p.handshake_wait_ms),
            dhcp_start_delay: ms(p2p.dhcp_start_delay_ms),
            client_connect_delay: ms(p2p.client_connect_delay_ms),
            go_intent: GoIntent::new(p2p.go_intent)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            frequency: p2p.frequency,
            peer_filter: PeerFilter::from_config(&p2p.target_peer_mac)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            max_peers: p2p.max_peers,
            go_address: self.network.go_address,
            netmask: self.network.netmask,
            pool_start: self.network.pool_start,
        })
    }

    pub fn echo_settings(&self) -> EchoSettings {
        EchoSettings {
            port: self.echo.port,
            packet_size: self.echo.packet_size,
            interval: Duration::from_millis(self.echo.interval_ms),
            count: self.echo.count,
            recv_timeout: Duration::from_millis(self.echo.recv_timeout_ms),
            stop_grace: Duration::from_millis(self.echo.stop_grace_ms),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform location, or defaults when absent.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<NodeConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads and validates `NodeConfig` from `path`, returning defaults if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::Invalid`] if a value is out of range.
pub fn load_config_from(path: &Path) -> Result<NodeConfig, ConfigError> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<NodeConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => NodeConfig::default(),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &NodeConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("P2PEcho"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("p2pecho"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("P2PEcho")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
