//! Length-prefixed framed channel carrying the tier protocol between aggregation nodes.

mod deserialize;
pub mod msg;
pub mod params;
mod receiver;
mod sender;
mod serialize;

use tokio::io::{AsyncRead, AsyncWrite};

pub use deserialize::Deserialize;
pub use params::Parameters;
pub use receiver::OnoReceiver;
pub use sender::OnoSender;
pub use serialize::Serialize;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Frames larger than this are rejected before allocating a buffer for them.
const MAX_FRAME_LEN: usize = 1 << 30;

/// Splits a connection into its framed halves.
///
/// # Arguments
/// * `rx` - The reading half of the connection.
/// * `tx` - The writing half of the connection.
///
/// # Returns
/// The receiver reading frames from `rx` and the sender writing frames to `tx`.
pub fn channel<R, W>(rx: R, tx: W) -> (OnoReceiver<R>, OnoSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (OnoReceiver::new(rx), OnoSender::new(tx))
}
