pub trait Serialize<'a> {
    /// Writes the owned part of `self` into `buf`.
    ///
    /// Returns a trailing slice that should be written right after `buf`
    /// without being copied into it, if any.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
