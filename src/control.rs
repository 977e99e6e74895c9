//! The consumed control-shard interface (spec §6): the main gateway shard
//! hands voice-server/session updates to this crate; this crate never owns
//! that websocket or the bot's REST credentials.

use crate::constants::INIT_DATA_TIMEOUT;
use crate::id::{ChannelId, GuildId, UserId};
use crate::info::ConnectionInfo;
use crate::session::error::ConnectError;
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

/// An update delivered by the control shard while a voice connection is
/// being established or maintained.
#[derive(Clone, Debug)]
pub enum ControlUpdate {
    /// Voice server assignment: the endpoint to connect to and a fresh token.
    ServerUpdate { endpoint: String, token: String },
    /// Session assignment for this (guild, user) pair.
    StateUpdate { session_id: String },
}

/// Requests the control shard sends on this crate's behalf.
#[async_trait]
pub trait ControlShard: Send + Sync {
    /// Asks the control shard to join `channel`, which will eventually
    /// produce server/state updates on the returned channel.
    async fn request_join(&self, guild: GuildId, channel: ChannelId) -> UnboundedReceiver<ControlUpdate>;
}

/// The consumed forwarded-stream interface (spec §4.8/§5): an external sink
/// that receives one downmixed, Opus-encoded frame per mixer tick once
/// [`crate::config::Config::forward_mixed_audio`] is enabled. Never called
/// concurrently with itself for the same guild — the bridge-worker side of
/// the tick that produces these frames is single-consumer by construction.
#[async_trait]
pub trait ForwardSink: Send + Sync {
    /// Delivers one mixed, Opus-encoded frame for `guild`.
    async fn send_mixed_frame(&self, guild: GuildId, frame: Vec<u8>);
}

/// Accumulates `ControlUpdate`s into a complete [`ConnectionInfo`], timing
/// out after [`INIT_DATA_TIMEOUT`] if the control shard never completes the
/// handshake (matches `State::CollectingInitData`'s 10s budget, spec §4.6).
pub async fn collect_connection_info(
    mut updates: UnboundedReceiver<ControlUpdate>,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ConnectionInfo, ConnectError> {
    let mut endpoint = None;
    let mut token = None;
    let mut session_id = None;

    timeout(INIT_DATA_TIMEOUT, async {
        while endpoint.is_none() || token.is_none() || session_id.is_none() {
            match updates.recv().await {
                Some(ControlUpdate::ServerUpdate { endpoint: e, token: t }) => {
                    endpoint = Some(e);
                    token = Some(t);
                },
                Some(ControlUpdate::StateUpdate { session_id: s }) => {
                    session_id = Some(s);
                },
                None => break,
            }
        }
    })
    .await
    .map_err(|_| ConnectError::InitDataTimeout)?;

    match (endpoint, token, session_id) {
        (Some(endpoint), Some(token), Some(session_id)) => Ok(ConnectionInfo {
            endpoint,
            guild_id,
            session_id,
            token,
            user_id,
        }),
        _ => Err(ConnectError::InitDataTimeout),
    }
}
