use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    convert::TryInto,
    fmt::{Display, Error, Formatter},
    str::FromStr,
};

pub const HASH_SIZE: usize = 32; // 32 bytes / 256 bits

#[derive(Eq, PartialEq, PartialOrd, Ord, Clone, Debug, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    pub const fn zero() -> Self {
        Hash::new([0; HASH_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; HASH_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    // Number of leading zero hex digits, used for the PoW difficulty test
    pub fn leading_zeros(&self) -> u8 {
        let mut count = 0;
        for byte in self.0.iter() {
            if byte >> 4 != 0 {
                break;
            }
            count += 1;
            if byte & 0x0f != 0 {
                break;
            }
            count += 1;
        }
        count
    }
}

impl FromStr for Hash {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| "Invalid hex string")?;
        let bytes: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| "Invalid hash")?;
        Ok(Hash::new(bytes))
    }
}

// Hash a byte array using SHA-256
#[inline(always)]
pub fn hash(value: &[u8]) -> Hash {
    let result: [u8; HASH_SIZE] = Sha256::digest(value).into();
    Hash(result)
}

// Hash ASCII components joined with the chain's `-` separator
// Every preimage on the chain (transactions, blocks, contract addresses,
// merkle pairs) goes through this function
pub fn sha256_parts(parts: &[&str]) -> Hash {
    hash(parts.join("-").as_bytes())
}

impl AsRef<Hash> for Hash {
    fn as_ref(&self) -> &Hash {
        self
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", &self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        if hex.len() != HASH_SIZE * 2 {
            return Err(SerdeError::custom("Invalid hex length"));
        }

        let decoded_hex = hex::decode(hex).map_err(SerdeError::custom)?;
        let bytes: [u8; HASH_SIZE] = decoded_hex
            .try_into()
            .map_err(|_| SerdeError::custom("Could not transform hex to bytes array for Hash"))?;
        Ok(Hash::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string
        let h = hash(b"");
        assert_eq!(
            h.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_parts_are_separated() {
        // "ab"+"c" and "a"+"bc" must not collide thanks to the separator
        assert_ne!(sha256_parts(&["ab", "c"]), sha256_parts(&["a", "bc"]));
        assert_eq!(sha256_parts(&["ab", "c"]), hash(b"ab-c"));
    }

    #[test]
    fn test_leading_zeros() {
        assert_eq!(Hash::zero().leading_zeros(), 64);

        let mut bytes = [0xffu8; HASH_SIZE];
        assert_eq!(Hash::new(bytes).leading_zeros(), 0);

        bytes[0] = 0x0f;
        assert_eq!(Hash::new(bytes).leading_zeros(), 1);

        bytes[0] = 0x00;
        bytes[1] = 0x0f;
        assert_eq!(Hash::new(bytes).leading_zeros(), 3);
    }

    #[test]
    fn test_hex_round_trip() {
        let h = hash(b"round trip");
        let parsed: Hash = h.to_hex().parse().unwrap();
        assert_eq!(h, parsed);
    }
}
