use std::hash::{Hash, Hasher};

/// Content-hashed document identity (spec §3 "Global Id (GID) / Bucket
/// Id"). 128 bits, opaque beyond the top bits used for bucket routing.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Gid([u8; 16]);

impl Gid {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Gid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Hash for Gid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

/// Bucket id derived from the top bits of a [`Gid`]; used for routing and
/// for grouping maintenance work (spec §3).
///
/// `num_bucket_bits` is a deployment-wide constant; this core exposes it
/// as a parameter to [`BucketId::from_gid_with_bits`] rather than baking
/// in a value, since cluster sizing (out of scope, §1) decides it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BucketId(u32);

const DEFAULT_BUCKET_BITS: u32 = 16;

impl BucketId {
    pub fn new(raw: u32) -> Self {
        BucketId(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn from_gid(gid: &Gid) -> Self {
        Self::from_gid_with_bits(gid, DEFAULT_BUCKET_BITS)
    }

    pub fn from_gid_with_bits(gid: &Gid, num_bucket_bits: u32) -> Self {
        let top = u32::from_be_bytes(gid.0[0..4].try_into().unwrap());
        let shift = 32u32.saturating_sub(num_bucket_bits);
        BucketId(top >> shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_top_bits_same_bucket() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        a[0..4].copy_from_slice(&0xABCD_0000u32.to_be_bytes());
        b[0..4].copy_from_slice(&0xABCD_FFFFu32.to_be_bytes());
        let ga = Gid::from_bytes(a);
        let gb = Gid::from_bytes(b);
        assert_eq!(BucketId::from_gid_with_bits(&ga, 16), BucketId::from_gid_with_bits(&gb, 16));
    }

    #[test]
    fn different_top_bits_different_bucket() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        a[0..4].copy_from_slice(&0x0000_0000u32.to_be_bytes());
        b[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        let ga = Gid::from_bytes(a);
        let gb = Gid::from_bytes(b);
        assert_ne!(BucketId::from_gid_with_bits(&ga, 16), BucketId::from_gid_with_bits(&gb, 16));
    }
}
