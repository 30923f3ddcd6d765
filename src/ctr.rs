// SPDX-License-Identifier: MIT

//! The CTR_DRBG algorithm from NIST [SP 800-90A
//! Rev. 1](https://csrc.nist.gov/publications/detail/sp/800-90a/rev-1/final).
//!
//! [`CtrDrbg`] supports the AES-128/192/256 and 3DES (TDEA) variants,
//! with and without the block-cipher derivation function. The no-df
//! construction consumes a full-entropy input of exactly
//! `seedlen = keylen + outlen` bytes; the df construction condenses
//! entropy, nonce and personalization strings of arbitrary length into
//! the seed through BCC chaining.
//!
//! Callers supply the entropy explicitly. Deployments that want a
//! self-seeding generator should go through
//! [`RandomContext`](crate::context::RandomContext) or the global
//! context instead.
use crate::error::Error;

use aes::{
    cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit},
    Aes128Enc, Aes192Enc, Aes256Enc,
};
use alloc::vec;
use des::TdesEde3;
use zeroize::{Zeroize, Zeroizing};

const MAX_KEY_LEN: usize = 32;
const MAX_OUT_LEN: usize = 16;
const MAX_SEED_LEN: usize = MAX_KEY_LEN + MAX_OUT_LEN;

const TDES_BLOCK_LEN: usize = 8;
const AES_BLOCK_LEN: usize = 16;

//
// derivation function consts
//
const DF_MAX_OUTPUT_LEN: usize = 512 / 8;
const DF_KEY: [u8; MAX_KEY_LEN] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
    0x0f, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d,
    0x1e, 0x1f,
];

/// Block cipher backing a [`CtrDrbg`] instance.
///
/// The variant fixes the key and block (output) lengths and thereby the
/// seed length, the reseed interval, and the per-request bit ceiling.
/// The 3DES key is the packed 21-byte form, 7 bytes per DES key with the
/// parity bits elided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrCipher {
    TdesEde3,
    Aes128,
    Aes192,
    Aes256,
}

impl CtrCipher {
    /// Cipher key length in bytes (packed form for 3DES).
    pub fn key_len(self) -> usize {
        match self {
            CtrCipher::TdesEde3 => 21,
            CtrCipher::Aes128 => 16,
            CtrCipher::Aes192 => 24,
            CtrCipher::Aes256 => 32,
        }
    }

    /// Cipher block length in bytes; one generator output block.
    pub fn out_len(self) -> usize {
        match self {
            CtrCipher::TdesEde3 => TDES_BLOCK_LEN,
            _ => AES_BLOCK_LEN,
        }
    }

    /// `seedlen` of SP 800-90A: key length plus block length.
    pub fn seed_len(self) -> usize {
        self.key_len() + self.out_len()
    }

    /// Largest single request, in bits. Exactly at the ceiling is
    /// permitted.
    fn max_request_bits(self) -> usize {
        match self {
            CtrCipher::TdesEde3 => 1 << 13,
            _ => 1 << 19,
        }
    }

    /// True once the reseed counter has passed the variant's mandatory
    /// reseed interval (2^32 generate calls for 3DES, 2^48 for AES).
    fn reseed_exhausted(self, counter: u64) -> bool {
        match self {
            CtrCipher::TdesEde3 => (counter >> 32) != 0,
            _ => (counter >> 32) > 0xffff,
        }
    }
}

/// Expand a packed 21-byte 3DES key into the 24-byte form the cipher
/// expects, 7 packed bytes per 8-byte DES key. The parity bit positions
/// carry the shift residue; the cipher ignores them.
fn expand_tdes_key(key7: &[u8]) -> Zeroizing<[u8; 24]> {
    let mut key8 = Zeroizing::new([0u8; 24]);
    for i in 0..3 {
        let k7 = &key7[i * 7..];
        let k8 = &mut key8[i * 8..i * 8 + 8];
        k8[0] = k7[0] >> 1;
        k8[1] = (k7[0] << 6) | (k7[1] >> 2);
        k8[2] = (k7[1] << 5) | (k7[2] >> 3);
        k8[3] = (k7[2] << 4) | (k7[3] >> 4);
        k8[4] = (k7[3] << 3) | (k7[4] >> 5);
        k8[5] = (k7[4] << 2) | (k7[5] >> 6);
        k8[6] = (k7[5] << 1) | (k7[6] >> 7);
        k8[7] = k7[6];
    }
    key8
}

/// A keyed single-block encryptor over whichever cipher the instance
/// uses.
enum BlockCipher {
    Tdes(TdesEde3),
    Aes128(Aes128Enc),
    Aes192(Aes192Enc),
    Aes256(Aes256Enc),
}

impl BlockCipher {
    fn with_key(cipher: CtrCipher, key: &[u8]) -> Self {
        match cipher {
            CtrCipher::TdesEde3 => {
                let key8 = expand_tdes_key(key);
                BlockCipher::Tdes(TdesEde3::new(GenericArray::from_slice(&key8[..])))
            }
            CtrCipher::Aes128 => BlockCipher::Aes128(Aes128Enc::new(GenericArray::from_slice(key))),
            CtrCipher::Aes192 => BlockCipher::Aes192(Aes192Enc::new(GenericArray::from_slice(key))),
            CtrCipher::Aes256 => BlockCipher::Aes256(Aes256Enc::new(GenericArray::from_slice(key))),
        }
    }

    /// Encrypt one block in place. `block` must be exactly the cipher's
    /// block length.
    fn encrypt_in_place(&self, block: &mut [u8]) {
        match self {
            BlockCipher::Tdes(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes128(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes192(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes256(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
        }
    }
}

/// Increment a slice of bytes by 1 in big-endian order.
fn inc_bytes(block: &mut [u8]) {
    for byte in block.iter_mut().rev() {
        if *byte == 0xff {
            *byte = 0;
        } else {
            *byte += 1;
            break;
        }
    }
}

/// Block chaining function (BCC) used by the derivation function:
/// XOR-then-encrypt over `data` in block-length steps, starting from a
/// zero chaining value.
fn bcc(cipher: &BlockCipher, block_len: usize, data: &[u8], out: &mut [u8]) {
    debug_assert_eq!(data.len() % block_len, 0);
    out.fill(0);
    for chunk in data.chunks(block_len) {
        for (o, d) in out.iter_mut().zip(chunk) {
            *o ^= *d;
        }
        cipher.encrypt_in_place(out);
    }
}

/// Block cipher derivation function of SP 800-90A §10.3.2. Condenses the
/// concatenation of `inputs` into `output` (at most 512 bits).
fn block_cipher_df(cipher: CtrCipher, inputs: &[&[u8]], output: &mut [u8]) -> Result<(), Error> {
    if output.len() > DF_MAX_OUTPUT_LEN {
        return Err(Error::InvalidArgument);
    }
    let out_len = cipher.out_len();
    let key_len = cipher.key_len();
    let seed_len = cipher.seed_len();

    let total: usize = inputs.iter().map(|input| input.len()).sum();
    let mut pad = out_len - ((total + 9) % out_len);
    if pad == out_len {
        pad = 0;
    }

    // S = IV slot || L || N || input string || 0x80 || zero pad, sized to
    // a block multiple.
    let mut s = Zeroizing::new(vec![0u8; out_len + 9 + total + pad]);
    s[out_len..out_len + 4].copy_from_slice(&(total as u32).to_be_bytes());
    s[out_len + 4..out_len + 8].copy_from_slice(&(output.len() as u32).to_be_bytes());
    let mut at = out_len + 8;
    for input in inputs {
        s[at..at + input.len()].copy_from_slice(input);
        at += input.len();
    }
    s[at] = 0x80;

    //
    // Derive the intermediate K || X with the fixed key, one BCC pass per
    // block, bumping the IV block counter each pass.
    //
    let bcc_cipher = BlockCipher::with_key(cipher, &DF_KEY[..key_len]);
    let mut temp = Zeroizing::new([0u8; MAX_SEED_LEN]);
    for (i, chunk) in temp[..seed_len].chunks_mut(out_len).enumerate() {
        s[..4].copy_from_slice(&(i as u32).to_be_bytes());
        let mut block = [0u8; MAX_OUT_LEN];
        bcc(&bcc_cipher, out_len, &s, &mut block[..out_len]);
        chunk.copy_from_slice(&block[..chunk.len()]);
    }

    // Expand X under K into the requested output.
    let out_cipher = BlockCipher::with_key(cipher, &temp[..key_len]);
    let mut x = Zeroizing::new([0u8; MAX_OUT_LEN]);
    x[..out_len].copy_from_slice(&temp[key_len..seed_len]);
    for chunk in output.chunks_mut(out_len) {
        out_cipher.encrypt_in_place(&mut x[..out_len]);
        chunk.copy_from_slice(&x[..chunk.len()]);
    }
    Ok(())
}

/// A CTR_DRBG instance.
///
/// The state machine is [`new`](CtrDrbg::new)/[`new_df`](CtrDrbg::new_df),
/// then any interleaving of [`reseed`](CtrDrbg::reseed) and
/// [`generate`](CtrDrbg::generate); dropping the instance zeroizes its
/// key material. A continuous self-test failure poisons the instance
/// permanently.
///
/// # Example
///
/// ```
/// use fips_rng::ctr::{CtrCipher, CtrDrbg};
///
/// # use fips_rng::Error;
/// #
/// # fn main() -> Result<(), Error> {
/// #
/// // 48 bytes of full entropy for the AES-256 no-df construction.
/// let entropy = [0x3fu8; 48];
/// let mut drbg = CtrDrbg::new(CtrCipher::Aes256, &entropy, b"app-label")?;
///
/// let mut random_data = [0u8; 32];
/// drbg.generate(None, &mut random_data)?;
/// drbg.reseed(&entropy, None)?;
/// #
/// # Ok(())
/// # }
/// ```
pub struct CtrDrbg {
    cipher: CtrCipher,
    ctx: BlockCipher,
    key: [u8; MAX_KEY_LEN],
    v: [u8; MAX_OUT_LEN],
    reseed_counter: u64,
    use_df: bool,
    #[cfg(feature = "fips")]
    history: [u8; MAX_OUT_LEN],
    #[cfg(feature = "fips")]
    failed: bool,
    #[cfg(all(feature = "fips", test))]
    force_fail: bool,
}

impl Drop for CtrDrbg {
    fn drop(&mut self) {
        self.key.zeroize();
        self.v.zeroize();
        #[cfg(feature = "fips")]
        self.history.zeroize();
    }
}

impl CtrDrbg {
    /// Instantiate without the derivation function. `entropy` must be a
    /// full-entropy input of exactly `seedlen` bytes
    /// ([`CtrCipher::seed_len`]); the personalization string may be up
    /// to `seedlen` bytes and is XORed into the seed.
    ///
    /// # Error
    ///
    /// [`Error::BadEntropyLength`] if the entropy input is not exactly
    /// `seedlen` bytes; [`Error::BadPersonalizationLength`] if the
    /// personalization string is longer than `seedlen`.
    pub fn new(cipher: CtrCipher, entropy: &[u8], personalization: &[u8]) -> Result<Self, Error> {
        if personalization.len() > cipher.seed_len() {
            return Err(Error::BadPersonalizationLength);
        }
        let mut drbg = Self::zeroed(cipher, false);
        let personalization = if personalization.is_empty() {
            None
        } else {
            Some(personalization)
        };
        drbg.reseed(entropy, personalization)?;
        Ok(drbg)
    }

    /// Instantiate with the derivation function: entropy, nonce and
    /// personalization of arbitrary length are condensed into the seed.
    pub fn new_df(
        cipher: CtrCipher,
        entropy: &[u8],
        nonce: &[u8],
        personalization: &[u8],
    ) -> Result<Self, Error> {
        let mut drbg = Self::zeroed(cipher, true);
        let seed_len = cipher.seed_len();
        let mut seed = Zeroizing::new([0u8; MAX_SEED_LEN]);
        let inputs: [&[u8]; 3] = [entropy, nonce, personalization];
        let count = if personalization.is_empty() { 2 } else { 3 };
        block_cipher_df(cipher, &inputs[..count], &mut seed[..seed_len])?;
        drbg.update(&seed[..seed_len]);
        drbg.reseed_counter = 1;
        Ok(drbg)
    }

    /// The cipher variant backing this instance.
    pub fn cipher(&self) -> CtrCipher {
        self.cipher
    }

    /// Reseed with fresh entropy and optional additional input,
    /// resetting the reseed counter. In no-df mode the entropy length
    /// must again equal `seedlen`; in df mode it is arbitrary.
    pub fn reseed(&mut self, entropy: &[u8], additional: Option<&[u8]>) -> Result<(), Error> {
        let seed_len = self.cipher.seed_len();
        let additional = additional.unwrap_or(&[]);
        let mut seed = Zeroizing::new([0u8; MAX_SEED_LEN]);
        if self.use_df {
            let inputs: [&[u8]; 2] = [entropy, additional];
            let count = if additional.is_empty() { 1 } else { 2 };
            block_cipher_df(self.cipher, &inputs[..count], &mut seed[..seed_len])?;
        } else {
            if entropy.len() != seed_len {
                return Err(Error::BadEntropyLength);
            }
            let n = additional.len().min(seed_len);
            seed[..n].copy_from_slice(&additional[..n]);
            for (s, e) in seed[..seed_len].iter_mut().zip(entropy) {
                *s ^= *e;
            }
        }
        self.update(&seed[..seed_len]);
        self.reseed_counter = 1;
        Ok(())
    }

    /// Fill `output` with generator output, folding the optional
    /// additional input into the state first.
    ///
    /// # Error
    ///
    /// [`Error::ReseedRequired`] once the reseed interval is exhausted
    /// (caller must [`reseed`](CtrDrbg::reseed) and retry);
    /// [`Error::RequestTooLarge`] if the request exceeds the per-call
    /// ceiling (2^19 bits for AES, 2^13 for 3DES);
    /// [`Error::CtrDrbgSelfTestFailed`] on a continuous-test failure,
    /// which permanently poisons the instance. On any error no output
    /// bytes are valid.
    pub fn generate(&mut self, additional: Option<&[u8]>, output: &mut [u8]) -> Result<(), Error> {
        #[cfg(feature = "fips")]
        if self.failed {
            return Err(Error::CtrDrbgSelfTestFailed);
        }
        if self.cipher.reseed_exhausted(self.reseed_counter) {
            return Err(Error::ReseedRequired);
        }
        if output.len() * 8 > self.cipher.max_request_bits() {
            return Err(Error::RequestTooLarge);
        }

        let seed_len = self.cipher.seed_len();
        let out_len = self.cipher.out_len();
        let mut temp = Zeroizing::new([0u8; MAX_SEED_LEN]);
        if let Some(add) = additional.filter(|a| !a.is_empty()) {
            if self.use_df {
                block_cipher_df(self.cipher, &[add], &mut temp[..seed_len])?;
            } else {
                let n = add.len().min(seed_len);
                temp[..n].copy_from_slice(&add[..n]);
            }
            self.update(&temp[..seed_len]);
        }

        for chunk in output.chunks_mut(out_len) {
            inc_bytes(&mut self.v[..out_len]);
            let mut block = [0u8; MAX_OUT_LEN];
            block[..out_len].copy_from_slice(&self.v[..out_len]);
            self.ctx.encrypt_in_place(&mut block[..out_len]);
            #[cfg(feature = "fips")]
            self.continuous_check(&block[..out_len])?;
            chunk.copy_from_slice(&block[..chunk.len()]);
        }

        // Refresh Key/V for backtracking resistance, with the same
        // additional-input-derived data (or zeros).
        self.update(&temp[..seed_len]);
        self.reseed_counter += 1;
        Ok(())
    }

    fn zeroed(cipher: CtrCipher, use_df: bool) -> Self {
        let key = [0u8; MAX_KEY_LEN];
        Self {
            cipher,
            ctx: BlockCipher::with_key(cipher, &key[..cipher.key_len()]),
            key,
            v: [0u8; MAX_OUT_LEN],
            reseed_counter: 0,
            use_df,
            #[cfg(feature = "fips")]
            history: [0u8; MAX_OUT_LEN],
            #[cfg(feature = "fips")]
            failed: false,
            #[cfg(all(feature = "fips", test))]
            force_fail: false,
        }
    }

    /// CTR_DRBG update transform: `seedlen` bytes of keystream XORed
    /// with the provided data become the new Key || V, and the cipher is
    /// re-keyed.
    fn update(&mut self, provided: &[u8]) {
        let key_len = self.cipher.key_len();
        let out_len = self.cipher.out_len();
        let seed_len = key_len + out_len;
        debug_assert_eq!(provided.len(), seed_len);

        let mut temp = Zeroizing::new([0u8; MAX_SEED_LEN]);
        let mut filled = 0;
        while filled < seed_len {
            inc_bytes(&mut self.v[..out_len]);
            let mut block = [0u8; MAX_OUT_LEN];
            block[..out_len].copy_from_slice(&self.v[..out_len]);
            self.ctx.encrypt_in_place(&mut block[..out_len]);
            let n = (seed_len - filled).min(out_len);
            temp[filled..filled + n].copy_from_slice(&block[..n]);
            filled += n;
        }
        for (t, p) in temp[..seed_len].iter_mut().zip(provided) {
            *t ^= *p;
        }
        self.key[..key_len].copy_from_slice(&temp[..key_len]);
        self.v[..out_len].copy_from_slice(&temp[key_len..seed_len]);
        self.ctx = BlockCipher::with_key(self.cipher, &self.key[..key_len]);
    }

    /// FIPS 140-2 continuous test: an output block equal to its
    /// predecessor is a fatal failure for this instance.
    #[cfg(feature = "fips")]
    fn continuous_check(&mut self, block: &[u8]) -> Result<(), Error> {
        let out_len = block.len();
        #[cfg(test)]
        if self.force_fail {
            self.history[..out_len].copy_from_slice(block);
        }
        if self.history[..out_len] == *block {
            self.failed = true;
            return Err(Error::CtrDrbgSelfTestFailed);
        }
        self.history[..out_len].copy_from_slice(block);
        Ok(())
    }

    #[cfg(all(feature = "fips", test))]
    fn force_continuous_failure(&mut self) {
        self.force_fail = true;
    }
}

#[cfg(test)]
mod tests {
    use super::{expand_tdes_key, CtrCipher, CtrDrbg};
    use crate::error::Error;

    #[derive(Default)]
    struct TestCfg {
        entropy: &'static str,
        nonce: &'static str,
        reseed: &'static str,
        output: &'static str,
        add_0: &'static str,
        add_1: &'static str,
        add_2: &'static str,
        personal: &'static str,
    }

    fn opt(v: &[u8]) -> Option<&[u8]> {
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    }

    fn run_ctr_cavs_test(cfg: TestCfg) -> Result<(), Error> {
        let entropy = hex::decode(cfg.entropy).unwrap();
        let nonce = hex::decode(cfg.nonce).unwrap();
        let reseed = hex::decode(cfg.reseed).unwrap();
        let output = hex::decode(cfg.output).unwrap();
        let add_0 = hex::decode(cfg.add_0).unwrap();
        let add_1 = hex::decode(cfg.add_1).unwrap();
        let add_2 = hex::decode(cfg.add_2).unwrap();
        let personal = hex::decode(cfg.personal).unwrap();

        let mut drbg = CtrDrbg::new_df(CtrCipher::Aes256, &entropy, &nonce, &personal)?;
        drbg.reseed(&reseed, opt(&add_0))?;
        let mut bytes = [0u8; 64];
        drbg.generate(opt(&add_1), &mut bytes)?;
        drbg.generate(opt(&add_2), &mut bytes)?;
        assert_eq!(output, bytes);
        Ok(())
    }

    //
    // Test vectors from CAVS 14.3, [AES-256 use df].
    //

    #[test]
    fn ctr_drbg_256_df_0() -> Result<(), Error> {
        let cfg = TestCfg {
            entropy: "2d4c9f46b981c6a0b2b5d8c69391e569ff13851437ebc0fc00d616340252fed5",
            nonce: "0bf814b411f65ec4866be1abb59d3c32",
            reseed: "93500fae4fa32b86033b7a7bac9d37e710dcc67ca266bc8607d665937766d207",
            output: "322dd28670e75c0ea638f3cb68d6a9d6e50ddfd052b772a7b1d78263a7b8978b6740c2b65a9550c3a76325866fa97e16d74006bc96f26249b9f0a90d076f08e5",
            add_0: "",
            add_1: "",
            add_2: "",
            personal: "",
        };
        run_ctr_cavs_test(cfg)
    }

    #[test]
    fn ctr_drbg_256_df_1() -> Result<(), Error> {
        let cfg = TestCfg {
            entropy: "200f096b76e3bf2f40133ae6649221084f0afb11f96fe86a4987ae7b1159d032",
            nonce: "3be56f6c0ae289dfc636f96cff5daaa1",
            reseed: "895133f4f2d1be25ec929d42e904dbc7749939ad7022a90360a743fd2c3f483c",
            output: "bf12bf4d8eb6bbbd9f91a2ef48c6bc6524a133dde3c8d4f13d4b5cdae3b9e041b98c8650ada9e1f2b5df01d875470b220cacad0ee887080c271929f695204b66",
            add_0: "",
            add_1: "",
            add_2: "",
            personal: "",
        };
        run_ctr_cavs_test(cfg)
    }

    #[test]
    fn ctr_drbg_256_df_add_0() -> Result<(), Error> {
        let cfg = TestCfg {
            entropy: "6f60f0f9d486bc23e1223b934e61c0c78ae9232fa2e9a87c6dacd447c3f10e9e",
            nonce: "401e3f87762fa8a14ab232ccb8480a2f",
            reseed: "350be52552a65a804a106543ebb7dd046cffae104e4e8b2f18936d564d3c1950",
            add_0: "7a3688adb1cfb6c03264e2762ece96bfe4daf9558fabf74d7fff203c08b4dd9f",
            add_1: "67cf4a56d081c53670f257c25557014cd5e8b0e919aa58f23d6861b10b00ea80",
            add_2: "648d4a229198b43f33dd7dd8426650be11c5656adcdf913bb3ee5eb49a2a3892",
            output: "2d819fb9fee38bfc3f15a07ef0e183ff36db5d3184cea1d24e796ba103687415abe6d9f2c59a11931439a3d14f45fc3f4345f331a0675a3477eaf7cd89107e37",
            personal: "",
        };
        run_ctr_cavs_test(cfg)
    }

    #[test]
    fn ctr_drbg_256_df_per_0() -> Result<(), Error> {
        let cfg = TestCfg {
            entropy: "5bb14bec3a2e435acab8b891f075107df387902cb2cd996021b1a1245d4ea2b5",
            nonce: "12ac7f444e247f770d2f4d0a65fdab4e",
            personal: "2e957d53cba5a6b9b8a2ce4369bb885c0931788015b9fe5ac3c01a7ec5eacd70",
            reseed: "19f30c84f6dbf1caf68cbec3d4bb90e5e8f5716eae8c1bbadaba99a2a2bd4eb2",
            output: "b7dd8ac2c5eaa97c779fe46cc793b9b1e7b940c318d3b531744b42856f298264e45f9a0aca5da93e7f34f0ebc0ed0ea32c009e3e03cf01320c9a839807575405",
            add_0: "",
            add_1: "",
            add_2: "",
        };
        run_ctr_cavs_test(cfg)
    }

    #[test]
    fn ctr_drbg_256_df_per_add_0() -> Result<(), Error> {
        let cfg = TestCfg {
            entropy: "174b46250051a9e3d80c56ae7163dafe7e54481a56cafd3b8625f99bbb29c442",
            nonce: "98ffd99c466e0e94a45da7e0e82dbc6b",
            personal: "7095268e99938b3e042734b9176c9aa051f00a5f8d2a89ada214b89beef18ebf",
            reseed: "e88be1967c5503f65d23867bbc891bd679db03b4878663f6c877592df25f0d9a",
            add_0: "cdf6ad549e45b6aa5cd67d024931c33cd133d52d5ae500c3015020beb30da063",
            add_1: "c7228e90c62f896a09e11684530102f926ec90a3255f6c21b857883c75800143",
            add_2: "76a94f224178fe4cbf9e2b8acc53c9dc3e50bb613aac8936601453cda3293b17",
            output: "1a6d8dbd642076d13916e5e23038b60b26061f13dd4e006277e0268698ffb2c87e453bae1251631ac90c701a9849d933995e8b0221fe9aca1985c546c2079027",
        };
        run_ctr_cavs_test(cfg)
    }

    //
    // Structural and policy tests.
    //

    #[test]
    fn no_df_is_deterministic() -> Result<(), Error> {
        let entropy = [0x3cu8; 48];
        let mut a = CtrDrbg::new(CtrCipher::Aes256, &entropy, b"label")?;
        let mut b = CtrDrbg::new(CtrCipher::Aes256, &entropy, b"label")?;
        let mut out_a = [0u8; 48];
        let mut out_b = [0u8; 48];
        a.generate(None, &mut out_a)?;
        b.generate(None, &mut out_b)?;
        assert_eq!(out_a, out_b);

        // Successive requests from one instance must not repeat.
        let mut out_c = [0u8; 48];
        a.generate(None, &mut out_c)?;
        assert_ne!(out_a, out_c);
        Ok(())
    }

    #[test]
    fn no_df_entropy_length_is_enforced() {
        let short = [0u8; 47];
        assert_eq!(
            CtrDrbg::new(CtrCipher::Aes256, &short, &[]).err(),
            Some(Error::BadEntropyLength)
        );
        let long = [0u8; 49];
        assert_eq!(
            CtrDrbg::new(CtrCipher::Aes256, &long, &[]).err(),
            Some(Error::BadEntropyLength)
        );
        // AES-128 wants 32, 3DES wants 29.
        assert!(CtrDrbg::new(CtrCipher::Aes128, &[1u8; 32], &[]).is_ok());
        assert!(CtrDrbg::new(CtrCipher::TdesEde3, &[1u8; 29], &[]).is_ok());
    }

    #[test]
    fn personalization_length_is_enforced() {
        let entropy = [0u8; 48];
        let personal = [0u8; 49];
        assert_eq!(
            CtrDrbg::new(CtrCipher::Aes256, &entropy, &personal).err(),
            Some(Error::BadPersonalizationLength)
        );
    }

    #[test]
    fn reseed_interval_boundary_aes() -> Result<(), Error> {
        let entropy = [0x77u8; 48];
        let mut drbg = CtrDrbg::new(CtrCipher::Aes256, &entropy, &[])?;
        let mut buf = [0u8; 16];

        drbg.reseed_counter = (1u64 << 48) - 1;
        drbg.generate(None, &mut buf)?;
        assert_eq!(
            drbg.generate(None, &mut buf).err(),
            Some(Error::ReseedRequired)
        );

        drbg.reseed(&entropy, None)?;
        assert_eq!(drbg.reseed_counter, 1);
        drbg.generate(None, &mut buf)?;
        Ok(())
    }

    #[test]
    fn reseed_interval_boundary_tdes() -> Result<(), Error> {
        let entropy = [0x55u8; 29];
        let mut drbg = CtrDrbg::new(CtrCipher::TdesEde3, &entropy, &[])?;
        let mut buf = [0u8; 8];

        drbg.reseed_counter = (1u64 << 32) - 1;
        drbg.generate(None, &mut buf)?;
        assert_eq!(
            drbg.generate(None, &mut buf).err(),
            Some(Error::ReseedRequired)
        );
        Ok(())
    }

    #[test]
    fn request_ceiling_aes() -> Result<(), Error> {
        let entropy = [0x11u8; 48];
        let mut drbg = CtrDrbg::new(CtrCipher::Aes256, &entropy, &[])?;

        // Exactly 2^19 bits succeeds; one byte more does not.
        let mut at_limit = alloc::vec![0u8; 1 << 16];
        drbg.generate(None, &mut at_limit)?;
        let mut over = alloc::vec![0u8; (1 << 16) + 1];
        assert_eq!(
            drbg.generate(None, &mut over).err(),
            Some(Error::RequestTooLarge)
        );
        Ok(())
    }

    #[test]
    fn request_ceiling_tdes() -> Result<(), Error> {
        let entropy = [0x22u8; 29];
        let mut drbg = CtrDrbg::new(CtrCipher::TdesEde3, &entropy, &[])?;

        let mut at_limit = alloc::vec![0u8; 1 << 10];
        drbg.generate(None, &mut at_limit)?;
        let mut over = alloc::vec![0u8; (1 << 10) + 1];
        assert_eq!(
            drbg.generate(None, &mut over).err(),
            Some(Error::RequestTooLarge)
        );
        Ok(())
    }

    #[test]
    fn tdes_key_expansion() {
        let key7 = [0x01u8; 21];
        let key8 = expand_tdes_key(&key7);
        let one_des_key = [0x00, 0x40, 0x20, 0x10, 0x08, 0x04, 0x02, 0x01];
        assert_eq!(key8[0..8], one_des_key);
        assert_eq!(key8[8..16], one_des_key);
        assert_eq!(key8[16..24], one_des_key);
    }

    #[test]
    fn tdes_df_is_deterministic() -> Result<(), Error> {
        let entropy = [0xabu8; 32];
        let nonce = [0xcdu8; 16];
        let mut a = CtrDrbg::new_df(CtrCipher::TdesEde3, &entropy, &nonce, &[])?;
        let mut b = CtrDrbg::new_df(CtrCipher::TdesEde3, &entropy, &nonce, &[])?;
        let mut out_a = [0u8; 24];
        let mut out_b = [0u8; 24];
        a.generate(None, &mut out_a)?;
        b.generate(None, &mut out_b)?;
        assert_eq!(out_a, out_b);

        let other_nonce = [0xceu8; 16];
        let mut c = CtrDrbg::new_df(CtrCipher::TdesEde3, &entropy, &other_nonce, &[])?;
        let mut out_c = [0u8; 24];
        c.generate(None, &mut out_c)?;
        assert_ne!(out_a, out_c);
        Ok(())
    }

    #[cfg(feature = "fips")]
    #[test]
    fn continuous_test_is_fatal() -> Result<(), Error> {
        let entropy = [0x09u8; 48];
        let mut drbg = CtrDrbg::new(CtrCipher::Aes256, &entropy, &[])?;
        let mut buf = [0u8; 16];
        drbg.generate(None, &mut buf)?;

        drbg.force_continuous_failure();
        assert_eq!(
            drbg.generate(None, &mut buf).err(),
            Some(Error::CtrDrbgSelfTestFailed)
        );
        // Poisoned for good; a fresh instance is the only way out.
        assert_eq!(
            drbg.generate(None, &mut buf).err(),
            Some(Error::CtrDrbgSelfTestFailed)
        );
        Ok(())
    }
}
