//! voxbridge is a voice transport and mixing engine for a chat-platform bot,
//! written in Rust. It owns, per guild, the real-time voice session with the
//! platform: a TLS-framed signalling handshake, an encrypted RTP datagram
//! path, and the multi-speaker decode/mixer that feeds either a forwarding
//! consumer or a downmixed outbound stream. A small per-guild song pipeline
//! (see [`producer`]) feeds the engine from pluggable streaming sources.
//!
//! The crate is deliberately narrow: it does not own a REST client, a
//! control-plane gateway shard, or configuration/logging setup for the
//! embedding bot. Those are external collaborators described by the traits
//! in [`control`] and [`producer::source`]; wiring them up is the
//! embedding application's job.
//!
//! ## Shape
//!
//! [`engine::EngineRegistry`] maps a guild id to an owned [`engine::GuildEngine`],
//! replacing the implicit per-guild globals of earlier designs with a single
//! explicit owner. A `GuildEngine` bundles a [`session::VoiceSession`] (the
//! handshake state machine and sockets), an [`producer::AudioProducer`] (the
//! song pipeline), and a [`speaker::SpeakerRegistry`] (inbound decode/mix),
//! driven at a 20ms cadence by [`clock::Pacer`] and supervised for
//! reconnects by [`supervisor::Supervisor`].

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod constants;
pub mod control;
pub mod crypto;
pub mod engine;
pub mod id;
pub(crate) mod info;
pub mod mailbox;
pub mod model;
pub mod producer;
pub mod ring;
pub mod rtp;
pub mod session;
pub mod speaker;
pub mod supervisor;
pub mod udp;
pub mod ws;

pub use audiopus::{self as opus, Bitrate};

pub use crate::{
    config::Config,
    engine::{EngineRegistry, GuildEngine},
    info::ConnectionInfo,
};
