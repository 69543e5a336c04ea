//! Writing side of the framed channel.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, Serialize};

/// Writes length-prefixed frames to an async writer.
pub struct OnoSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    frame: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> OnoSender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            frame: Vec::new(),
        }
    }

    /// Encodes `msg` into a single frame and flushes it.
    ///
    /// # Arguments
    /// * `msg` - The message to send.
    ///
    /// # Returns
    /// An io error if `msg` can't be encoded or the writer fails.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> io::Result<()> {
        self.frame.clear();
        self.frame.resize(LEN_TYPE_SIZE, 0);
        msg.serialize(&mut self.frame)?;

        let body_len = (self.frame.len() - LEN_TYPE_SIZE) as LenType;
        self.frame[..LEN_TYPE_SIZE].copy_from_slice(&body_len.to_be_bytes());

        self.tx.write_all(&self.frame).await?;
        self.tx.flush().await
    }
}
