//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Keyed byte obfuscation
//!
//! [`KeyCipher`] scrambles bytes with a repeating key. It exists so casual
//! inspection of a capture does not reveal plaintext packets, nothing more.
//! It is **not** a cryptographic primitive: there is no confidentiality against
//! a motivated observer and no integrity protection. Do not rely on it for
//! secrets.

use std::fmt;

use crate::{CodecError, CodecResult};

/// Longest key accepted by [`KeyCipher::set_key`].
pub const MAX_KEY_LEN: usize = 256;

/// Position-dependent XOR transform.
///
/// Each byte is XORed with `key[cursor % key.len()]` and the cursor advances by
/// one. The transform is its own inverse, so two ciphers holding the same key
/// and cursor turn each other's output back into the input. With no key
/// installed the cipher passes bytes through untouched.
#[derive(Clone, Default)]
pub struct KeyCipher {
    key: Vec<u8>,
    cursor: usize,
}

impl KeyCipher {
    /// Create a pass-through cipher
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cipher with the given key installed
    pub fn with_key(key: &[u8]) -> CodecResult<Self> {
        let mut cipher = Self::new();
        cipher.set_key(key)?;
        Ok(cipher)
    }

    /// Install or replace the key and restart the cursor.
    ///
    /// An empty key turns the cipher into a pass-through.
    pub fn set_key(&mut self, key: &[u8]) -> CodecResult<()> {
        if key.len() > MAX_KEY_LEN {
            return Err(CodecError::KeyTooLong {
                len: key.len(),
                max: MAX_KEY_LEN,
            });
        }
        self.key.clear();
        self.key.extend_from_slice(key);
        self.cursor = 0;
        Ok(())
    }

    /// Remove the key
    pub fn clear(&mut self) {
        self.key.clear();
        self.cursor = 0;
    }

    /// Check if a key is installed
    pub fn is_active(&self) -> bool {
        !self.key.is_empty()
    }

    /// Length of the installed key (0 when inactive)
    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    /// Current position within the key
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Transform `data` in place and advance the cursor
    pub fn apply(&mut self, data: &mut [u8]) {
        if self.key.is_empty() {
            return;
        }
        let len = self.key.len();
        for byte in data.iter_mut() {
            *byte ^= self.key[self.cursor];
            self.cursor += 1;
            if self.cursor == len {
                self.cursor = 0;
            }
        }
    }
}

impl fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCipher")
            .field("key_len", &self.key.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}
