use md5::{Digest, Md5};

/// Wire identity of a message: the first and second big-endian 32-bit words
/// of the 128-bit digest of `"<Name>_<version>"`. Together they form the
/// 64-bit discriminator a decoder dispatches on.
pub fn message_identity(name: &str, version: i64) -> (u32, u32) {
    let digest = Md5::digest(format!("{}_{}", name, version).as_bytes());
    let hi = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let lo = u32::from_be_bytes([digest[4], digest[5], digest[6], digest[7]]);
    (hi, lo)
}

/// The packed 64-bit form emitted into generated code.
pub fn identity_value(identity: (u32, u32)) -> u64 {
    ((identity.0 as u64) << 32) | identity.1 as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_matches_digest() {
        let digest = Md5::digest(b"Player_2");
        let (hi, lo) = message_identity("Player", 2);
        assert_eq!(&hi.to_be_bytes()[..], &digest[0..4]);
        assert_eq!(&lo.to_be_bytes()[..], &digest[4..8]);
    }

    #[test]
    fn test_identity_is_stable() {
        assert_eq!(message_identity("Player", 2), message_identity("Player", 2));
    }

    #[test]
    fn test_identity_changes_with_version() {
        assert_ne!(message_identity("Player", 1), message_identity("Player", 2));
        assert_ne!(message_identity("Player", 0), message_identity("Enemy", 0));
    }

    #[test]
    fn test_identity_value_packs_halves() {
        let value = identity_value((0x12345678, 0x9ABCDEF0));
        assert_eq!(value, 0x12345678_9ABCDEF0);
    }
}
