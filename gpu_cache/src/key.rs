// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content-derived resource keys.

use core::hash::{BuildHasher, Hash, Hasher};
use core::sync::atomic::{AtomicU32, Ordering};
use foldhash::fast::FixedState;
use smallvec::SmallVec;

/// Seed for key hashing. Fixed so that hashes are stable across runs.
const KEY_HASH_SEED: u64 = 0x6b65_795f_6361_6368;

/// A family of unique keys.
///
/// Each subsystem that mints unique keys allocates its own domain once, so
/// that keys built from the same data words by different subsystems never
/// compare equal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyDomain(u32);

impl KeyDomain {
    /// The raw domain value.
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

/// An immutable fingerprint naming exactly one resource.
///
/// Two keys are equal when their domain and data words are equal. The tag is
/// a diagnostic label and does not participate in equality or hashing.
#[derive(Clone, Debug)]
pub struct UniqueKey {
    domain: KeyDomain,
    data: SmallVec<[u32; 6]>,
    hash: u64,
    tag: &'static str,
}

impl UniqueKey {
    /// Allocates a fresh [`KeyDomain`].
    ///
    /// Domains are process-wide and never reused.
    pub fn generate_domain() -> KeyDomain {
        static NEXT_DOMAIN: AtomicU32 = AtomicU32::new(1);
        KeyDomain(NEXT_DOMAIN.fetch_add(1, Ordering::Relaxed))
    }

    /// Starts building a key in `domain` with the diagnostic `tag`.
    pub fn builder(domain: KeyDomain, tag: &'static str) -> UniqueKeyBuilder {
        UniqueKeyBuilder {
            domain,
            data: SmallVec::new(),
            tag,
        }
    }

    /// The domain this key belongs to.
    #[inline]
    pub fn domain(&self) -> KeyDomain {
        self.domain
    }

    /// The data words of this key.
    #[inline]
    pub fn data(&self) -> &[u32] {
        &self.data
    }

    /// The diagnostic tag attached when the key was built.
    #[inline]
    pub fn tag(&self) -> &'static str {
        self.tag
    }
}

impl Hash for UniqueKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for UniqueKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.domain == other.domain && self.data == other.data
    }
}

impl Eq for UniqueKey {}

/// Accumulates data words for a [`UniqueKey`].
#[derive(Clone, Debug)]
pub struct UniqueKeyBuilder {
    domain: KeyDomain,
    data: SmallVec<[u32; 6]>,
    tag: &'static str,
}

impl UniqueKeyBuilder {
    /// Appends a 32-bit word.
    #[must_use]
    pub fn push(mut self, word: u32) -> Self {
        self.data.push(word);
        self
    }

    /// Appends a 64-bit value as two words, low word first.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "splitting into halves is the intent"
    )]
    pub fn push_u64(self, value: u64) -> Self {
        self.push(value as u32).push((value >> 32) as u32)
    }

    /// Finishes the key, computing its hash once.
    pub fn build(self) -> UniqueKey {
        let hash = FixedState::with_seed(KEY_HASH_SEED).hash_one((self.domain.0, &self.data[..]));
        UniqueKey {
            domain: self.domain,
            data: self.data,
            hash,
            tag: self.tag,
        }
    }
}
