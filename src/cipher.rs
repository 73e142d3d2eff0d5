//! AES-CTR stream cipher session
//!
//! Both directions of the channel run independent AES counter-mode contexts
//! with no padding; ciphertext length always equals plaintext length.
//! Payload is processed in chunks no larger than the negotiated limit, which
//! mirrors the bounded cipher buffers of peer implementations and is an
//! interoperability requirement, and the IV arithmetic must be bit-exact
//! with the peer.

use crate::error::{Error, Result};
use aes::{Aes128, Aes192, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// AES block length in bytes; IVs are one block
pub const AES_BLOCK_SIZE: usize = 16;

type Aes128Ctr = Ctr128BE<Aes128>;
type Aes192Ctr = Ctr128BE<Aes192>;
type Aes256Ctr = Ctr128BE<Aes256>;

/// Negotiated key/IV material for one cipher session
///
/// Key length selects the AES variant: 16, 24 or 32 bytes for
/// AES-128/192/256. Each direction carries its own key and 16-byte IV. The
/// chunk size must be identical on both sides of a connection. All material
/// is zeroed on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CipherMaterial {
    pub encrypt_key: Vec<u8>,
    pub encrypt_iv: Vec<u8>,
    pub decrypt_key: Vec<u8>,
    pub decrypt_iv: Vec<u8>,
    pub chunk_size: usize,
}

/// One direction's running AES-CTR context
enum CtrContext {
    Aes128(Box<Aes128Ctr>),
    Aes192(Box<Aes192Ctr>),
    Aes256(Box<Aes256Ctr>),
}

impl CtrContext {
    fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        if iv.len() != AES_BLOCK_SIZE {
            return Err(Error::Initialization(format!(
                "cipher IV must be {} bytes, got {}",
                AES_BLOCK_SIZE,
                iv.len()
            )));
        }
        let init_error =
            |e| Error::Initialization(format!("cannot initialize AES-CTR context: {}", e));
        match key.len() {
            16 => Ok(Self::Aes128(Box::new(
                Aes128Ctr::new_from_slices(key, iv).map_err(init_error)?,
            ))),
            24 => Ok(Self::Aes192(Box::new(
                Aes192Ctr::new_from_slices(key, iv).map_err(init_error)?,
            ))),
            32 => Ok(Self::Aes256(Box::new(
                Aes256Ctr::new_from_slices(key, iv).map_err(init_error)?,
            ))),
            other => Err(Error::Initialization(format!(
                "cipher key must be 16, 24 or 32 bytes, got {}",
                other
            ))),
        }
    }

    fn apply_keystream(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = match self {
            Self::Aes128(context) => context.try_apply_keystream(buf),
            Self::Aes192(context) => context.try_apply_keystream(buf),
            Self::Aes256(context) => context.try_apply_keystream(buf),
        };
        result.map_err(|e| Error::Cipher(format!("AES-CTR keystream failure: {}", e)))
    }
}

/// Stream-cipher session for one authenticated connection
///
/// The encrypt and decrypt contexts are fully independent; each carries its
/// running counter state forward across calls, so every call must see its
/// direction's bytes in strict stream order. The decrypt byte offset is a
/// running total for bookkeeping and IV re-derivation only; it is never fed
/// back into the live context.
pub struct CipherSession {
    encrypt: CtrContext,
    decrypt: CtrContext,
    initial_decrypt_iv: Zeroizing<[u8; AES_BLOCK_SIZE]>,
    decrypt_offset: u64,
    chunk_size: usize,
}

impl CipherSession {
    /// Build independent encrypt and decrypt contexts from negotiated
    /// material
    pub fn new(material: &CipherMaterial) -> Result<Self> {
        if material.chunk_size == 0 {
            return Err(Error::Initialization(
                "cipher chunk size must be non-zero".to_string(),
            ));
        }

        let encrypt = CtrContext::new(&material.encrypt_key, &material.encrypt_iv)?;
        let decrypt = CtrContext::new(&material.decrypt_key, &material.decrypt_iv)?;

        let mut initial_decrypt_iv = Zeroizing::new([0u8; AES_BLOCK_SIZE]);
        initial_decrypt_iv.copy_from_slice(&material.decrypt_iv);

        debug!(
            key_bits = material.encrypt_key.len() * 8,
            chunk_size = material.chunk_size,
            "cipher session established"
        );

        Ok(Self {
            encrypt,
            decrypt,
            initial_decrypt_iv,
            decrypt_offset: 0,
            chunk_size: material.chunk_size,
        })
    }

    /// Transform plaintext to ciphertext
    ///
    /// Output length equals input length exactly. On a mid-stream failure
    /// the counter state is advanced only for the chunks that succeeded; the
    /// whole operation must be treated as failed and the session discarded.
    pub fn encode(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = input.to_vec();
        Self::apply_chunked(&mut self.encrypt, &mut output, self.chunk_size)?;
        Ok(output)
    }

    /// Transform ciphertext to plaintext
    ///
    /// Same chunking discipline and failure contract as
    /// [`encode`](Self::encode). Advances the decrypt byte offset by the
    /// number of input bytes consumed.
    pub fn decode(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = input.to_vec();
        Self::apply_chunked(&mut self.decrypt, &mut output, self.chunk_size)?;
        self.decrypt_offset += input.len() as u64;
        Ok(output)
    }

    /// Total plaintext bytes produced by `decode` since construction
    pub fn decrypt_offset(&self) -> u64 {
        self.decrypt_offset
    }

    /// Derive the decrypt-direction IV for an arbitrary byte offset
    ///
    /// Computed from the initial decrypt IV, independent of the live
    /// streaming context. Used to re-synchronize or validate an IV.
    pub fn decrypt_iv_at(&self, byte_offset: u64) -> [u8; AES_BLOCK_SIZE] {
        calculate_iv(&self.initial_decrypt_iv, byte_offset / AES_BLOCK_SIZE as u64)
    }

    fn apply_chunked(context: &mut CtrContext, buf: &mut [u8], chunk_size: usize) -> Result<()> {
        for chunk in buf.chunks_mut(chunk_size) {
            context.apply_keystream(chunk)?;
        }
        Ok(())
    }
}

/// Add a 64-bit block counter into a 16-byte IV
///
/// The IV is treated as one big-endian integer; the counter is added into
/// its lowest 8 bytes with the carry propagated leftward across all 16
/// bytes. The counter's most significant byte aligns with the IV's
/// 8th-from-last byte. Must remain bit-exact with the peer implementation.
pub fn calculate_iv(initial_iv: &[u8; AES_BLOCK_SIZE], counter: u64) -> [u8; AES_BLOCK_SIZE] {
    let mut iv = [0u8; AES_BLOCK_SIZE];
    let mut counter = counter;
    let mut sum: u32 = 0;

    for (processed, index) in (0..AES_BLOCK_SIZE).rev().enumerate() {
        // (sum >> 8) is the carry-out of the previous byte.
        sum = u32::from(initial_iv[index]) + (sum >> 8);
        if processed < 8 {
            sum += (counter & 0xff) as u32;
            counter >>= 8;
        }
        iv[index] = (sum & 0xff) as u8;
    }

    iv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(key_len: usize, chunk_size: usize) -> CipherMaterial {
        // Mirrored keys and IVs so one session can decode its own output.
        let key: Vec<u8> = (0..key_len).map(|i| i as u8).collect();
        let iv: Vec<u8> = (0..AES_BLOCK_SIZE).map(|i| 0xa0 + i as u8).collect();
        CipherMaterial {
            encrypt_key: key.clone(),
            encrypt_iv: iv.clone(),
            decrypt_key: key,
            decrypt_iv: iv,
            chunk_size,
        }
    }

    /// Material for the two ends of one connection: A encrypts what B
    /// decrypts and vice versa.
    fn paired_materials(chunk_a: usize, chunk_b: usize) -> (CipherMaterial, CipherMaterial) {
        let key_ab: Vec<u8> = (0..16).map(|i| 0x10 + i as u8).collect();
        let key_ba: Vec<u8> = (0..16).map(|i| 0x20 + i as u8).collect();
        let iv_ab: Vec<u8> = (0..16).map(|i| 0x30 + i as u8).collect();
        let iv_ba: Vec<u8> = (0..16).map(|i| 0x40 + i as u8).collect();
        let a = CipherMaterial {
            encrypt_key: key_ab.clone(),
            encrypt_iv: iv_ab.clone(),
            decrypt_key: key_ba.clone(),
            decrypt_iv: iv_ba.clone(),
            chunk_size: chunk_a,
        };
        let b = CipherMaterial {
            encrypt_key: key_ba,
            encrypt_iv: iv_ba,
            decrypt_key: key_ab,
            decrypt_iv: iv_ab,
            chunk_size: chunk_b,
        };
        (a, b)
    }

    #[test]
    fn test_round_trip_across_chunk_sizes() {
        let payload: Vec<u8> = (0..100).map(|i| (i * 7 % 256) as u8).collect();
        // Chunk limits smaller than, equal to, and larger than the payload.
        for chunk_size in [1, 7, 16, 100, 1024] {
            for len in [0, 1, 15, 16, 17, 99, 100] {
                let mut session = CipherSession::new(&material(32, chunk_size)).unwrap();
                let ciphertext = session.encode(&payload[..len]).unwrap();
                assert_eq!(ciphertext.len(), len);
                let plaintext = session.decode(&ciphertext).unwrap();
                assert_eq!(plaintext, &payload[..len]);
            }
        }
    }

    #[test]
    fn test_all_key_lengths() {
        for key_len in [16, 24, 32] {
            let mut session = CipherSession::new(&material(key_len, 64)).unwrap();
            let ciphertext = session.encode(b"distributed filesystem").unwrap();
            let plaintext = session.decode(&ciphertext).unwrap();
            assert_eq!(plaintext, b"distributed filesystem");
        }
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        let result = CipherSession::new(&material(20, 64));
        assert!(matches!(result, Err(Error::Initialization(_))));
    }

    #[test]
    fn test_invalid_iv_length_rejected() {
        let mut bad = material(16, 64);
        bad.encrypt_iv = vec![0u8; 12];
        let result = CipherSession::new(&bad);
        assert!(matches!(result, Err(Error::Initialization(_))));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = CipherSession::new(&material(16, 0));
        assert!(matches!(result, Err(Error::Initialization(_))));
    }

    #[test]
    fn test_deterministic_ciphertext() {
        let payload: Vec<u8> = (0..257).map(|i| (i % 256) as u8).collect();
        let mut first = CipherSession::new(&material(16, 32)).unwrap();
        let mut second = CipherSession::new(&material(16, 32)).unwrap();
        assert_eq!(
            first.encode(&payload).unwrap(),
            second.encode(&payload).unwrap()
        );
    }

    #[test]
    fn test_ciphertext_differs_from_plaintext() {
        let mut session = CipherSession::new(&material(16, 64)).unwrap();
        let payload = vec![0x55u8; 48];
        let ciphertext = session.encode(&payload).unwrap();
        assert_ne!(ciphertext, payload);
    }

    #[test]
    fn test_streaming_equivalence_across_call_splits() {
        let chunk_size = 16;
        let payload: Vec<u8> = (0..3 * chunk_size + 5).map(|i| (i * 13 % 256) as u8).collect();

        let mut one_shot = CipherSession::new(&material(16, chunk_size)).unwrap();
        let expected = one_shot.encode(&payload).unwrap();

        // Arbitrary sub-lengths, fed in order to a fresh session.
        let splits = [10usize, 1, chunk_size, payload.len() - 10 - 1 - chunk_size];
        let mut split_session = CipherSession::new(&material(16, chunk_size)).unwrap();
        let mut actual = Vec::new();
        let mut offset = 0;
        for split in splits {
            actual.extend(split_session.encode(&payload[offset..offset + split]).unwrap());
            offset += split;
        }
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_interop_across_differing_chunk_limits() {
        let (material_a, material_b) = paired_materials(8, 100);
        let mut a = CipherSession::new(&material_a).unwrap();
        let mut b = CipherSession::new(&material_b).unwrap();

        let payload: Vec<u8> = (0..250).map(|i| (i * 3 % 256) as u8).collect();
        let ciphertext = a.encode(&payload).unwrap();
        assert_eq!(b.decode(&ciphertext).unwrap(), payload);

        let reply: Vec<u8> = (0..77).map(|i| (255 - i) as u8).collect();
        let ciphertext = b.encode(&reply).unwrap();
        assert_eq!(a.decode(&ciphertext).unwrap(), reply);
    }

    #[test]
    fn test_ctr_known_answer() {
        // NIST SP 800-38A F.5.1, AES-128-CTR, first block.
        let mut session = CipherSession::new(&CipherMaterial {
            encrypt_key: hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap(),
            encrypt_iv: hex::decode("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff").unwrap(),
            decrypt_key: hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap(),
            decrypt_iv: hex::decode("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff").unwrap(),
            chunk_size: 512,
        })
        .unwrap();
        let plaintext = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let ciphertext = session.encode(&plaintext).unwrap();
        assert_eq!(
            hex::encode(ciphertext),
            "874d6191b620e3261bef6864990db6ce"
        );
    }

    #[test]
    fn test_decrypt_offset_accounting() {
        let mut session = CipherSession::new(&material(16, 8)).unwrap();
        assert_eq!(session.decrypt_offset(), 0);
        session.decode(&[0u8; 21]).unwrap();
        assert_eq!(session.decrypt_offset(), 21);
        session.decode(&[0u8; 11]).unwrap();
        assert_eq!(session.decrypt_offset(), 32);
        // Encoding never moves the decrypt offset.
        session.encode(&[0u8; 64]).unwrap();
        assert_eq!(session.decrypt_offset(), 32);
    }

    #[test]
    fn test_calculate_iv_simple_add() {
        let iv = calculate_iv(&[0u8; 16], 1);
        let mut expected = [0u8; 16];
        expected[15] = 0x01;
        assert_eq!(iv, expected);

        let iv = calculate_iv(&[0u8; 16], 0x0102);
        let mut expected = [0u8; 16];
        expected[14] = 0x01;
        expected[15] = 0x02;
        assert_eq!(iv, expected);
    }

    #[test]
    fn test_calculate_iv_zero_counter_is_identity() {
        let initial: [u8; 16] = *b"0123456789abcdef";
        assert_eq!(calculate_iv(&initial, 0), initial);
    }

    #[test]
    fn test_calculate_iv_full_carry_propagation() {
        // Carry must run past the 8-byte counter field across all 16 bytes.
        let iv = calculate_iv(&[0xff; 16], 1);
        assert_eq!(iv, [0u8; 16]);
    }

    #[test]
    fn test_calculate_iv_carry_into_ninth_byte() {
        let mut initial = [0u8; 16];
        for byte in initial[8..].iter_mut() {
            *byte = 0xff;
        }
        let iv = calculate_iv(&initial, 1);
        let mut expected = [0u8; 16];
        expected[7] = 0x01;
        assert_eq!(iv, expected);
    }

    #[test]
    fn test_calculate_iv_max_counter() {
        let iv = calculate_iv(&[0u8; 16], u64::MAX);
        let mut expected = [0u8; 16];
        for byte in expected[8..].iter_mut() {
            *byte = 0xff;
        }
        assert_eq!(iv, expected);
    }

    #[test]
    fn test_decrypt_iv_at_matches_block_arithmetic() {
        let session = CipherSession::new(&material(16, 16)).unwrap();
        let initial: [u8; 16] = (0..16)
            .map(|i| 0xa0 + i as u8)
            .collect::<Vec<u8>>()
            .try_into()
            .unwrap();
        assert_eq!(session.decrypt_iv_at(0), initial);
        assert_eq!(session.decrypt_iv_at(32), calculate_iv(&initial, 2));
        // Mid-block offsets round down to the containing block.
        assert_eq!(session.decrypt_iv_at(33), calculate_iv(&initial, 2));
    }
}
