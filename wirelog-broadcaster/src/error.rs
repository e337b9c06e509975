use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BroadcasterError {
    #[error("failed to bind log listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BroadcasterError>;
