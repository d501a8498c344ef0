//! RAOP audio payload decryption (AES-128-CBC)

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, KeyInit};

const BLOCK_SIZE: usize = 16;

/// Audio payload decryptor
///
/// Each packet is decrypted independently: the chain restarts from the
/// session IV for every payload. Only whole 16-byte blocks are encrypted;
/// a trailing partial block is sent in the clear.
#[derive(Clone)]
pub struct AudioDecryptor {
    cipher: Aes128,
    iv: [u8; BLOCK_SIZE],
}

impl AudioDecryptor {
    /// Create a decryptor from the session key and IV
    #[must_use]
    pub fn new(key: [u8; 16], iv: [u8; 16]) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(&key)),
            iv,
        }
    }

    /// Decrypt one audio payload
    #[must_use]
    pub fn decrypt(&self, encrypted: &[u8]) -> Vec<u8> {
        let encrypted_len = (encrypted.len() / BLOCK_SIZE) * BLOCK_SIZE;
        let mut decrypted = Vec::with_capacity(encrypted.len());

        let mut prev_block = self.iv;
        for chunk in encrypted[..encrypted_len].chunks_exact(BLOCK_SIZE) {
            let mut block = GenericArray::clone_from_slice(chunk);
            self.cipher.decrypt_block(&mut block);

            for (b, p) in block.iter_mut().zip(prev_block.iter()) {
                *b ^= *p;
            }

            decrypted.extend_from_slice(&block);
            prev_block.copy_from_slice(chunk);
        }

        decrypted.extend_from_slice(&encrypted[encrypted_len..]);
        decrypted
    }
}

impl std::fmt::Debug for AudioDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDecryptor").finish_non_exhaustive()
    }
}
