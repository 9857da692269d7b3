//! Key strategies - how a table hashes and compares its keys
//!
//! A strategy is a zero-sized type; the table calls its associated functions
//! directly, so hashing and equality are resolved at compile time.

use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

use rustc_hash::FxHasher;

/// Hash and equality for keys of type `K`
pub trait KeyOps<K: ?Sized> {
    fn hash(key: &K) -> u64;
    fn equals(a: &K, b: &K) -> bool;
}

/// Hash a byte sequence followed by its length
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.write_u64(bytes.len() as u64);
    hasher.finish()
}

/// Integer keys
#[derive(Debug, Clone, Copy, Default)]
pub struct U64Keys;

impl KeyOps<u64> for U64Keys {
    #[inline]
    fn hash(key: &u64) -> u64 {
        let mut hasher = FxHasher::default();
        hasher.write_u64(*key);
        hasher.finish()
    }

    #[inline]
    fn equals(a: &u64, b: &u64) -> bool {
        a == b
    }
}

/// String keys, compared by content
#[derive(Debug, Clone, Copy, Default)]
pub struct StrKeys;

impl<'k> KeyOps<&'k str> for StrKeys {
    #[inline]
    fn hash(key: &&'k str) -> u64 {
        hash_bytes(key.as_bytes())
    }

    #[inline]
    fn equals(a: &&'k str, b: &&'k str) -> bool {
        a == b
    }
}

impl KeyOps<String> for StrKeys {
    #[inline]
    fn hash(key: &String) -> u64 {
        hash_bytes(key.as_bytes())
    }

    #[inline]
    fn equals(a: &String, b: &String) -> bool {
        a == b
    }
}

/// Byte-slice keys, compared by content
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesKeys;

impl<'k> KeyOps<&'k [u8]> for BytesKeys {
    #[inline]
    fn hash(key: &&'k [u8]) -> u64 {
        hash_bytes(key)
    }

    #[inline]
    fn equals(a: &&'k [u8], b: &&'k [u8]) -> bool {
        a == b
    }
}

/// Any `Hash + Eq` key, hashed with FxHasher
pub struct HashKeys<K: ?Sized>(PhantomData<fn(&K)>);

impl<K: Hash + Eq + ?Sized> KeyOps<K> for HashKeys<K> {
    #[inline]
    fn hash(key: &K) -> u64 {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[inline]
    fn equals(a: &K, b: &K) -> bool {
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_ignores_address() {
        let owned = String::from("symbol");
        let literal: &str = "symbol";
        assert_eq!(
            <StrKeys as KeyOps<&str>>::hash(&owned.as_str()),
            <StrKeys as KeyOps<&str>>::hash(&literal)
        );
        assert!(<StrKeys as KeyOps<&str>>::equals(&owned.as_str(), &literal));
    }

    #[test]
    fn length_participates_in_hash() {
        assert_ne!(hash_bytes(b""), hash_bytes(b"\0"));
        assert_ne!(hash_bytes(b"ab"), hash_bytes(b"abc"));
    }

    #[test]
    fn string_and_str_strategies_agree() {
        let owned = String::from("kx");
        assert_eq!(
            <StrKeys as KeyOps<String>>::hash(&owned),
            <StrKeys as KeyOps<&str>>::hash(&"kx")
        );
        assert_eq!(
            <BytesKeys as KeyOps<&[u8]>>::hash(&b"kx".as_slice()),
            hash_bytes(b"kx")
        );
    }

    #[test]
    fn integer_keys() {
        assert_eq!(U64Keys::hash(&7), U64Keys::hash(&7));
        assert_ne!(U64Keys::hash(&7), U64Keys::hash(&8));
        assert!(U64Keys::equals(&1, &1));
        assert!(!U64Keys::equals(&1, &2));
    }

    #[test]
    fn generic_keys() {
        type Pairs = HashKeys<(u32, char)>;
        assert_eq!(Pairs::hash(&(1, 'a')), Pairs::hash(&(1, 'a')));
        assert!(Pairs::equals(&(1, 'a'), &(1, 'a')));
        assert!(!Pairs::equals(&(1, 'a'), &(1, 'b')));
    }
}
