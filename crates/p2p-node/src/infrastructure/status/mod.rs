//! Serializable status snapshots.
//!
//! The node's live state (`SessionContext`, `EchoStats`) sits behind locks and
//! carries internal types such as `MacAddress`.  The DTOs here are plain
//! snapshots with string-typed enums, safe to print as JSON or hand to any
//! front-end.
//!
//! # `CommandResult<T>`
//!
//! Every query returns the same envelope:
//! ```json
//! { "success": true,  "data": {...}, "error": null  }
//! { "success": false, "data": null,  "error": "..."  }
//! ```
//! so a caller uses one error-handling pattern for all commands.

use std::sync::Arc;

use p2p_core::EchoStats;
use serde::{Deserialize, Serialize};

use crate::application::commands::NodeCommand;
use crate::application::node::{CommandOutcome, NodeStatus, P2pNode};

// ── DTOs ──────────────────────────────────────────────────────────────────────

/// Full node status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDto {
    /// `"IDLE"`, `"FINDING"`, ..., `"ERROR"`.
    pub state: String,
    /// `"UNDETERMINED"`, `"GROUP_OWNER"` or `"CLIENT"`.
    pub role: String,
    pub go_intent: u8,
    pub frequency_mhz: u32,
    pub group_formed: bool,
    pub connected: bool,
    /// `None` when there is no current peer.
    pub peer_mac: Option<String>,
    /// Device-found notifications in the current window.
    pub peer_count: u32,
    pub discovered: Vec<PeerDto>,
    pub pairing_in_flight: bool,
    pub echo_running: bool,
    pub echo: EchoStatsDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerDto {
    pub mac: String,
    pub name: String,
    pub rssi: i32,
}

/// Echo counters with derived values filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoStatsDto {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub packets_lost: u32,
    pub bytes_sent: u32,
    pub bytes_received: u32,
    pub rtt_min_us: Option<u32>,
    pub rtt_max_us: Option<u32>,
    pub rtt_avg_us: Option<u32>,
    pub loss_percent: Option<u32>,
}

impl From<&EchoStats> for EchoStatsDto {
    fn from(stats: &EchoStats) -> Self {
        let rtt = |v: u32| stats.has_rtt().then_some(v);
        Self {
            packets_sent: stats.packets_sent,
            packets_received: stats.packets_received,
            packets_lost: stats.packets_lost,
            bytes_sent: stats.bytes_sent,
            bytes_received: stats.bytes_received,
            rtt_min_us: rtt(stats.rtt_min_us),
            rtt_max_us: rtt(stats.rtt_max_us),
            rtt_avg_us: rtt(stats.rtt_avg_us),
            loss_percent: stats.loss_percent(),
        }
    }
}

impl From<&NodeStatus> for StatusDto {
    fn from(status: &NodeStatus) -> Self {
        let ctx = &status.session;
        Self {
            state: ctx.state.as_str().to_string(),
            role: ctx.role.as_str().to_string(),
            go_intent: ctx.go_intent.value(),
            frequency_mhz: ctx.frequency,
            group_formed: ctx.group_formed,
            connected: ctx.connected,
            peer_mac: ctx.peer().map(|mac| mac.to_string()),
            peer_count: ctx.peer_count,
            discovered: ctx
                .discovered
                .iter()
                .map(|p| PeerDto {
                    mac: p.mac.to_string(),
                    name: p.name.clone(),
                    rssi: p.rssi,
                })
                .collect(),
            pairing_in_flight: status.pairing_in_flight,
            echo_running: status.echo_running,
            echo: EchoStatsDto::from(&status.echo),
        }
    }
}

/// Unified response wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Queries ───────────────────────────────────────────────────────────────────

/// Current status of `node`.
pub fn get_status(node: &P2pNode) -> CommandResult<StatusDto> {
    CommandResult::ok(StatusDto::from(&node.status()))
}

/// Runs `command` and wraps its outcome.  Commands that do not produce a
/// status (pair, leave) answer with the status right after they ran.
pub async fn run_command(node: &Arc<P2pNode>, command: NodeCommand) -> CommandResult<StatusDto> {
    match node.handle_command(command).await {
        Ok(CommandOutcome::Status(status)) => CommandResult::ok(StatusDto::from(&status)),
        Ok(_) => get_status(node),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Serializes `result` as a single JSON line.
pub fn to_json<T: Serialize>(result: &CommandResult<T>) -> String {
    serde_json::to_string(result)
        .unwrap_or_else(|e| format!(r#"{{"success":false,"data":null,"error":"{e}"}}"#))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use p2p_core::{DiscoveredPeer, MacAddress, P2pRole, P2pState, SessionContext};

    use super::*;

    fn sample_status() -> NodeStatus {
        let mut session = SessionContext::new(4);
        session.record_device_found(DiscoveredPeer::new(
            MacAddress([0x02, 0, 0, 0, 0, 0x0b]),
            "node-b",
            -48,
        ));
        session.transition(P2pState::Connected);
        session.role = P2pRole::Client;
        session.connected = true;
        let mut echo = EchoStats::new();
        echo.record_reply(2_000, 64, 64);
        echo.record_loss(64);
        NodeStatus {
            session,
            echo,
            echo_running: true,
            pairing_in_flight: false,
        }
    }

    #[test]
    fn test_status_dto_uses_wire_names() {
        // Arrange
        let status = sample_status();

        // Act
        let dto = StatusDto::from(&status);

        // Assert
        assert_eq!(dto.state, "CONNECTED");
        assert_eq!(dto.role, "CLIENT");
        assert_eq!(dto.peer_mac.as_deref(), Some("02:00:00:00:00:0b"));
        assert_eq!(dto.discovered.len(), 1);
        assert_eq!(dto.echo.loss_percent, Some(50));
        assert_eq!(dto.echo.rtt_avg_us, Some(2_000));
    }

    #[test]
    fn test_echo_dto_hides_rtt_without_samples() {
        let dto = EchoStatsDto::from(&EchoStats::new());
        assert_eq!(dto.rtt_min_us, None);
        assert_eq!(dto.loss_percent, None);
    }

    #[test]
    fn test_command_result_json_shape() {
        let ok = to_json(&CommandResult::ok(StatusDto::from(&sample_status())));
        let err = to_json(&CommandResult::<StatusDto>::err("busy"));

        let ok: serde_json::Value = serde_json::from_str(&ok).unwrap();
        let err: serde_json::Value = serde_json::from_str(&err).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["data"]["state"], "CONNECTED");
        assert!(ok["error"].is_null());
        assert_eq!(err["success"], false);
        assert!(err["data"].is_null());
        assert_eq!(err["error"], "busy");
    }

    #[test]
    fn test_status_dto_round_trips_through_json() {
        let dto = StatusDto::from(&sample_status());
        let json = serde_json::to_string(&dto).unwrap();
        let restored: StatusDto = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, dto);
    }
}
