//! Errors raised by the song pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("streaming source error: {0}")]
    Source(String),
    #[error("no current song to {0}")]
    NothingPlaying(&'static str),
    #[error("queue index {0} out of range")]
    IndexOutOfRange(usize),
}

pub type ProducerResult<T> = std::result::Result<T, ProducerError>;
