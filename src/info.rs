use crate::id::{GuildId, UserId};
use std::fmt;

/// Everything needed to open a voice session: where to connect, which
/// guild/user it's for, and the ephemeral session/token pair handed over by
/// the control shard (spec §6).
#[derive(Clone)]
pub struct ConnectionInfo {
    /// URL of the voice signalling endpoint assigned to this session.
    pub endpoint: String,
    /// ID of the target voice channel's parent guild.
    pub guild_id: GuildId,
    /// Unique string describing this session for validation/authentication.
    pub session_id: String,
    /// Ephemeral secret used to validate the above session.
    pub token: String,
    /// User ID of this bot.
    pub user_id: UserId,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("endpoint", &self.endpoint)
            .field("guild_id", &self.guild_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .field("user_id", &self.user_id)
            .finish()
    }
}
