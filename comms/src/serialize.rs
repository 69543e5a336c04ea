use std::io;

/// Types that can be written into an outgoing frame.
pub trait Serialize {
    /// Appends the wire representation of `self` to `buf`.
    ///
    /// # Arguments
    /// * `buf` - The frame buffer, already holding the length prefix.
    ///
    /// # Returns
    /// An io error if the value can't be represented on the wire.
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()>;
}
