//! Streaming SHA-1 (FIPS 180-1).
//!
//! Content addressing must agree bit-for-bit with every other producer of the
//! on-disk format, so this is a straight implementation of the standard
//! compression function: five 32-bit state words, an 80-word message
//! schedule, and Merkle–Damgård padding with a 64-bit big-endian bit length.

use std::io;

const BLOCK_LEN: usize = 64;

const INITIAL_STATE: [u32; 5] = [0x6745_2301, 0xEFCD_AB89, 0x98BA_DCFE, 0x1032_5476, 0xC3D2_E1F0];

const K0: u32 = 0x5A82_7999;
const K1: u32 = 0x6ED9_EBA1;
const K2: u32 = 0x8F1B_BCDC;
const K3: u32 = 0xCA62_C1D6;

/// Incremental SHA-1 state.
///
/// Feed bytes with [`update`](Self::update) any number of times, then call
/// [`digest`](Self::digest) or [`finalize`](Self::finalize). Both consume the
/// hasher, so a finished instance cannot be reused.
///
/// ```
/// use odb_crypto::Sha1;
///
/// let mut h = Sha1::new();
/// h.update("ab");
/// h.update(b"c");
/// assert_eq!(h.digest(), "a9993e364706816aba3e25717850c26c9cd0d89d");
/// ```
#[derive(Clone, Debug)]
pub struct Sha1 {
    state: [u32; 5],
    block: [u8; BLOCK_LEN],
    block_len: usize,
    /// Total message length in bytes.
    total_len: u64,
}

impl Sha1 {
    pub fn new() -> Self {
        Self {
            state: INITIAL_STATE,
            block: [0u8; BLOCK_LEN],
            block_len: 0,
            total_len: 0,
        }
    }

    /// Absorb another chunk of the message. Accepts bytes or text.
    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        let data = data.as_ref();
        self.total_len = self.total_len.wrapping_add(data.len() as u64);
        self.absorb(data);
    }

    /// Finish the computation and return the raw 20-byte digest.
    pub fn finalize(mut self) -> [u8; 20] {
        let bit_len = self.total_len.wrapping_mul(8);

        // 0x80 terminator, zero fill to 56 mod 64, then the length.
        let mut padding = [0u8; BLOCK_LEN + 8];
        padding[0] = 0x80;
        let pad_len = if self.block_len < 56 {
            56 - self.block_len
        } else {
            120 - self.block_len
        };
        self.absorb(&padding[..pad_len]);
        self.absorb(&bit_len.to_be_bytes());
        debug_assert_eq!(self.block_len, 0);

        let mut out = [0u8; 20];
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.state) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        out
    }

    /// Finish the computation and return the 40-character lowercase hex digest.
    pub fn digest(self) -> String {
        hex::encode(self.finalize())
    }

    fn absorb(&mut self, mut data: &[u8]) {
        if self.block_len > 0 {
            let take = (BLOCK_LEN - self.block_len).min(data.len());
            self.block[self.block_len..self.block_len + take].copy_from_slice(&data[..take]);
            self.block_len += take;
            data = &data[take..];
            if self.block_len < BLOCK_LEN {
                return;
            }
            let block = self.block;
            compress(&mut self.state, &block);
            self.block_len = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_LEN);
        for block in &mut blocks {
            let mut buf = [0u8; BLOCK_LEN];
            buf.copy_from_slice(block);
            compress(&mut self.state, &buf);
        }

        let rest = blocks.remainder();
        self.block[..rest.len()].copy_from_slice(rest);
        self.block_len = rest.len();
    }
}

impl Default for Sha1 {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for Sha1 {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One-shot convenience: hex digest of `data`.
pub fn sha1_hex(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.digest()
}

fn compress(state: &mut [u32; 5], block: &[u8; BLOCK_LEN]) {
    let mut w = [0u32; 80];
    for (i, word) in block.chunks_exact(4).enumerate() {
        w[i] = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
    }
    for i in 16..80 {
        w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
    }

    let [mut a, mut b, mut c, mut d, mut e] = *state;
    for (i, &wi) in w.iter().enumerate() {
        let (f, k) = match i {
            0..=19 => ((b & c) | (!b & d), K0),
            20..=39 => (b ^ c ^ d, K1),
            40..=59 => ((b & c) | (b & d) | (c & d), K2),
            _ => (b ^ c ^ d, K3),
        };
        let temp = a
            .rotate_left(5)
            .wrapping_add(f)
            .wrapping_add(e)
            .wrapping_add(k)
            .wrapping_add(wi);
        e = d;
        d = c;
        c = b.rotate_left(30);
        b = a;
        a = temp;
    }

    state[0] = state[0].wrapping_add(a);
    state[1] = state[1].wrapping_add(b);
    state[2] = state[2].wrapping_add(c);
    state[3] = state[3].wrapping_add(d);
    state[4] = state[4].wrapping_add(e);
}
