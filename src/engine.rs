//! `EngineRegistry` / `GuildEngine`: a single explicit owner per guild,
//! replacing the reference implementation's per-guild global singleton
//! lookups (`getSongAPI(guild)`, `getVoiceConnection(guild)`) per the
//! REDESIGN FLAGS in spec §9/§4.10.

use crate::clock::Pacer;
use crate::config::Config;
use crate::constants::MONO_FRAME_SIZE;
use crate::control::ForwardSink;
use crate::id::{GuildId, UserId};
use crate::info::ConnectionInfo;
use crate::mailbox::AudioFrame;
use crate::model::payload::{build_speaking, inbound_from_value, Inbound};
use crate::producer::source::StreamingSourceSet;
use crate::producer::AudioProducer;
use crate::rtp;
use crate::session::error::TaskError;
use crate::session::VoiceSession;
use crate::speaker::SpeakerRegistry;
use crate::supervisor::Supervisor;
use crate::udp::IoMode;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// All per-guild state: the song pipeline, the voice session, the speaker
/// registry, and the stop token the engine's background tasks watch.
pub struct GuildEngine {
    pub guild: GuildId,
    config: Config,
    producer: AsyncMutex<AudioProducer>,
    session: AsyncMutex<VoiceSession>,
    speakers: SpeakerRegistry,
    forward: RwLock<Option<Arc<dyn ForwardSink>>>,
    stop: CancellationToken,
    orphaned: AtomicBool,
}

impl GuildEngine {
    pub fn new(
        guild: GuildId,
        config: Config,
        info: ConnectionInfo,
        sources: StreamingSourceSet,
    ) -> Arc<Self> {
        Arc::new(Self {
            guild,
            speakers: SpeakerRegistry::new(config.bitrate),
            producer: AsyncMutex::new(AudioProducer::new(guild, sources)),
            session: AsyncMutex::new(VoiceSession::new(info)),
            config,
            forward: RwLock::new(None),
            stop: CancellationToken::new(),
            orphaned: AtomicBool::new(false),
        })
    }

    pub async fn producer(&self) -> tokio::sync::MutexGuard<'_, AudioProducer> {
        self.producer.lock().await
    }

    pub fn speakers(&self) -> &SpeakerRegistry {
        &self.speakers
    }

    pub fn is_orphaned(&self) -> bool {
        self.orphaned.load(Ordering::Acquire)
    }

    /// Installs (or clears, with `None`) the bridge worker's forwarding
    /// sink. Has no effect unless [`Config::forward_mixed_audio`] is set.
    pub fn set_forward_sink(&self, sink: Option<Arc<dyn ForwardSink>>) {
        *self.forward.write() = sink;
    }

    /// Requests every background task for this guild to stop; does not
    /// block. Resources are released as each task observes the token.
    pub fn request_shutdown(&self) {
        self.stop.cancel();
    }

    /// Runs the steady-state engine loop until [`GuildEngine::request_shutdown`]
    /// is called or the connection supervisor exhausts its reconnect budget.
    #[instrument(skip(self), fields(guild = %self.guild))]
    pub async fn run(self: Arc<Self>) {
        let mut supervisor = Supervisor::new(self.config.max_reconnect_tries);

        {
            let mut session = self.session.lock().await;
            if let Err(e) = supervisor.establish(&mut session).await {
                warn!(error = %e, "could not establish voice session, giving up");
                return;
            }
        }

        let (pacer_tx, mut pacer_rx) = mpsc::unbounded_channel::<()>();
        let pacer_stop = self.stop.clone();
        std::thread::spawn(move || {
            let mut pacer = Pacer::new();
            while !pacer_stop.is_cancelled() {
                pacer.tick();
                if pacer_tx.send(()).is_err() {
                    break;
                }
            }
        });

        let start = Instant::now();
        let mut heartbeat_timer = tokio::time::interval({
            let session = self.session.lock().await;
            session.heartbeat_interval
        });
        let mut inbound_rx = {
            let session = self.session.lock().await;
            session.inbound_receiver()
        };

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => {
                    info!("engine shutdown requested");
                    break;
                },
                Some(()) = pacer_rx.recv() => {
                    if let Err(e) = self.run_tick().await {
                        warn!(error = %e, "steady-state tick failed");
                        let mut session = self.session.lock().await;
                        if !supervisor.handle_task_error(&mut session, e).await {
                            break;
                        }
                        inbound_rx = session.inbound_receiver();
                        heartbeat_timer = tokio::time::interval(session.heartbeat_interval);
                    }
                },
                _ = heartbeat_timer.tick() => {
                    let nonce = start.elapsed().as_nanos() as u64;
                    let mut session = self.session.lock().await;
                    match session.heartbeat_tick(nonce).await {
                        Ok(true) => {},
                        Ok(false) => {
                            warn!("heartbeat ack missing, forcing reconnect");
                            if !supervisor.handle_task_error(&mut session, TaskError::HeartbeatTimeout).await {
                                break;
                            }
                            inbound_rx = session.inbound_receiver();
                            heartbeat_timer = tokio::time::interval(session.heartbeat_interval);
                        },
                        Err(e) => warn!(error = %e, "failed to send heartbeat"),
                    }
                },
                value = recv_inbound(&inbound_rx), if inbound_rx.is_some() => {
                    if let Some(value) = value {
                        let mut session = self.session.lock().await;
                        self.dispatch_inbound_signalling(&mut session, value);
                    } else {
                        // The pump task ended (peer closed or a read error); drop the
                        // stale receiver so this arm stays disabled until the next
                        // reconnect hands back a fresh one.
                        inbound_rx = None;
                    }
                },
            }

            if supervisor.has_quit() {
                break;
            }
        }

        self.orphaned.store(true, Ordering::Release);
    }

    async fn run_tick(&self) -> Result<(), TaskError> {
        self.producer.lock().await.poll_completion().await;

        let frame = {
            let producer = self.producer.lock().await;
            producer.mailbox().try_recv()
        };

        let mut session = self.session.lock().await;
        let ssrc = session.ssrc;

        let payload = match frame {
            Some(AudioFrame::EncodedOpus(bytes)) => Some(bytes),
            Some(AudioFrame::RawPcm(_)) | Some(AudioFrame::Skip) | Some(AudioFrame::Unset) | None => None,
        };

        if let Some(payload) = payload {
            let cipher = session
                .cipher
                .as_ref()
                .ok_or(TaskError::InterconnectFailure("cipher not yet negotiated"))?;
            let header = session.rtp_state.next_header(MONO_FRAME_SIZE as u32);
            let sealed = cipher.seal(&header, &payload)?;
            let mut packet = Vec::with_capacity(header.len() + sealed.len());
            packet.extend_from_slice(&header);
            packet.extend_from_slice(&sealed);

            session.datagram.write_data(&packet);
            session.datagram.process_io(IoMode::Write).await?;
        }

        session.datagram.process_io(IoMode::Read).await?;
        let inbound = session.datagram.input_view();
        if !inbound.is_empty() {
            self.handle_inbound_rtp(&mut session, &inbound);
        }

        if self.config.forward_mixed_audio {
            if let Some(mixed) = self.speakers.mix_tick() {
                let sink = self.forward.read().clone();
                if let Some(sink) = sink {
                    sink.send_mixed_frame(self.guild, mixed).await;
                }
            }
        }

        if let Some(ws) = session.ws.as_mut() {
            let speaking = ws.send_json(&build_speaking(ssrc != 0, ssrc)).await;
            if let Err(e) = speaking {
                return Err(e.into());
            }
        }

        Ok(())
    }

    fn handle_inbound_rtp(&self, session: &mut VoiceSession, packet: &[u8]) {
        let Ok(header) = rtp::parse_header(packet) else {
            session.datagram.consume_input(packet.len());
            return;
        };
        let cipher = match session.cipher.as_ref() {
            Some(c) => c,
            None => {
                session.datagram.consume_input(packet.len());
                return;
            },
        };

        let mut raw_header = [0u8; 12];
        raw_header.copy_from_slice(&packet[..12]);
        let ciphertext = &packet[header.payload_offset..];

        match cipher.open(&raw_header, ciphertext) {
            Ok(decrypted) => {
                let skip = rtp::skip_extension(&header, &decrypted).unwrap_or(0);
                self.speakers.ingest(header.ssrc, &decrypted[skip..]);
            },
            Err(e) => warn!(error = %e, "failed to decrypt inbound rtp packet"),
        }

        session.datagram.consume_input(packet.len());
    }

    /// Handles one decoded signalling message received while `Connected`:
    /// speaker start/stop update the speaker registry, and a heartbeat ack
    /// clears the session's missed-ack flag.
    pub fn dispatch_inbound_signalling(&self, session: &mut VoiceSession, value: serde_json::Value) {
        match inbound_from_value(value) {
            Ok(Inbound::SpeakerStart(s)) => {
                self.speakers
                    .speaker_start(s.ssrc, UserId(s.user_id.unwrap_or(0)));
            },
            Ok(Inbound::SpeakerStop(s)) => {
                self.speakers.speaker_stop(UserId(s.user_id));
            },
            Ok(Inbound::HeartbeatAck) => {
                session.note_heartbeat_ack();
            },
            Ok(_) | Err(_) => {},
        }
    }
}

/// Awaits the next message on `rx`, or never resolves if `rx` is `None`.
/// Paired with a `select!` guard so the branch stays disabled until a
/// receiver is available.
async fn recv_inbound(rx: &Option<flume::Receiver<serde_json::Value>>) -> Option<serde_json::Value> {
    match rx {
        Some(rx) => rx.recv_async().await.ok(),
        None => std::future::pending().await,
    }
}

/// Maps guild id to an owned [`GuildEngine`]; all cross-component access
/// goes through a handle obtained here rather than through sibling
/// callbacks, replacing the reference implementation's implicit globals.
#[derive(Default)]
pub struct EngineRegistry {
    engines: RwLock<HashMap<GuildId, Arc<GuildEngine>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild: GuildId) -> Option<Arc<GuildEngine>> {
        self.engines.read().get(&guild).cloned()
    }

    pub fn insert(&self, engine: Arc<GuildEngine>) {
        self.engines.write().insert(engine.guild, engine);
    }

    /// Removes and shuts down the engine for `guild`, if one exists.
    pub fn remove(&self, guild: GuildId) {
        if let Some(engine) = self.engines.write().remove(&guild) {
            engine.request_shutdown();
        }
    }

    pub fn guild_count(&self) -> usize {
        self.engines.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_starts_empty() {
        let registry = EngineRegistry::new();
        assert_eq!(registry.guild_count(), 0);
    }
}
