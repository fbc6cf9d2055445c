//! AES-256 in Infinite Garble Extension mode.
//!
//! The 32-byte IV is split into the "previous ciphertext" half (`iv[..16]`)
//! and the "previous plaintext" half (`iv[16..]`).

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

const BLOCK: usize = 16;

fn xor_into(dst: &mut [u8; BLOCK], a: &[u8], b: &[u8]) {
    for ((d, x), y) in dst.iter_mut().zip(a).zip(b) {
        *d = x ^ y;
    }
}

fn split_iv(iv: &[u8; 32]) -> ([u8; BLOCK], [u8; BLOCK]) {
    let mut prev_cipher = [0u8; BLOCK];
    let mut prev_plain = [0u8; BLOCK];
    prev_cipher.copy_from_slice(&iv[..BLOCK]);
    prev_plain.copy_from_slice(&iv[BLOCK..]);
    (prev_cipher, prev_plain)
}

/// Encrypt `buffer` in place. Its length must be a multiple of 16.
pub fn ige_encrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % BLOCK, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let (mut prev_cipher, mut prev_plain) = split_iv(iv);

    for chunk in buffer.chunks_exact_mut(BLOCK) {
        let mut x = [0u8; BLOCK];
        xor_into(&mut x, chunk, &prev_cipher);
        let mut block = aes::Block::clone_from_slice(&x);
        cipher.encrypt_block(&mut block);

        let mut out = [0u8; BLOCK];
        xor_into(&mut out, &block, &prev_plain);
        prev_plain.copy_from_slice(chunk);
        chunk.copy_from_slice(&out);
        prev_cipher = out;
    }
}

/// Decrypt `buffer` in place. Its length must be a multiple of 16.
pub fn ige_decrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % BLOCK, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let (mut prev_cipher, mut prev_plain) = split_iv(iv);

    for chunk in buffer.chunks_exact_mut(BLOCK) {
        let mut x = [0u8; BLOCK];
        xor_into(&mut x, chunk, &prev_plain);
        let mut block = aes::Block::clone_from_slice(&x);
        cipher.decrypt_block(&mut block);

        let mut out = [0u8; BLOCK];
        xor_into(&mut out, &block, &prev_cipher);
        prev_cipher.copy_from_slice(chunk);
        chunk.copy_from_slice(&out);
        prev_plain = out;
    }
}
