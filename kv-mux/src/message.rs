/// A message that can travel across a [`crate::stream::FramedStream`].
///
/// Every request and response frame carries a sequence number that correlates a
/// response to the request that elicited it. The multiplexer owns sequence
/// assignment; implementors just need to store and report it.
pub trait Message: Send + 'static {
    /// The sequence number currently stamped on this message.
    fn seq(&self) -> u64;

    /// Stamps a new sequence number on this message.
    fn set_seq(&mut self, seq: u64);
}
