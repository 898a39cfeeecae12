//! User-based security model (RFC 3414 / RFC 3826) primitives
//!
//! Keys are localised once per configured user; verifying and decrypting a
//! notification then only costs one HMAC and one block cipher pass.
//!
//! AES-192 and AES-256 follow the Blumenthal key extension draft: the
//! localised privacy key is extended with digests of itself until it is
//! long enough, and the IV is built the same way as for AES-128.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{AsyncStreamCipher, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::Des;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::{Digest, Sha1};

use super::SnmpError;
use super::security::{AuthProtocol, PrivProtocol};

/// Truncated HMAC length carried in msgAuthenticationParameters
pub const AUTH_PARAMS_LEN: usize = 12;

/// Salt length carried in msgPrivacyParameters
pub const PRIV_PARAMS_LEN: usize = 8;

const EXPANSION_LEN: usize = 1_048_576;

type DesCbcDec = cbc::Decryptor<Des>;
type DesCbcEnc = cbc::Encryptor<Des>;
type Aes128CfbDec = cfb_mode::Decryptor<Aes128>;
type Aes128CfbEnc = cfb_mode::Encryptor<Aes128>;
type Aes192CfbDec = cfb_mode::Decryptor<Aes192>;
type Aes192CfbEnc = cfb_mode::Encryptor<Aes192>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;
type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;

fn localize<D: Digest>(password: &[u8], engine_id: &[u8]) -> Vec<u8> {
    let mut hasher = D::new();
    let mut block = [0u8; 64];
    let mut index = 0usize;
    for _ in 0..EXPANSION_LEN / block.len() {
        for b in block.iter_mut() {
            *b = password[index % password.len()];
            index += 1;
        }
        hasher.update(block);
    }
    let ku = hasher.finalize();

    let mut hasher = D::new();
    hasher.update(&ku);
    hasher.update(engine_id);
    hasher.update(&ku);
    hasher.finalize().to_vec()
}

/// RFC 3414 A.2 password-to-key followed by key localisation
pub fn password_to_key(
    protocol: AuthProtocol,
    password: &[u8],
    engine_id: &[u8],
) -> Result<Vec<u8>, SnmpError> {
    if password.is_empty() {
        return Err(SnmpError::Credentials("empty passphrase".to_string()));
    }
    Ok(match protocol {
        AuthProtocol::Md5 => localize::<Md5>(password, engine_id),
        AuthProtocol::Sha => localize::<Sha1>(password, engine_id),
    })
}

/// Extends a localised key to `len` bytes: `K || H(K) || H(K || H(K)) ...`
pub fn extend_key(protocol: AuthProtocol, mut key: Vec<u8>, len: usize) -> Vec<u8> {
    while key.len() < len {
        let digest = match protocol {
            AuthProtocol::Md5 => Md5::digest(&key).to_vec(),
            AuthProtocol::Sha => Sha1::digest(&key).to_vec(),
        };
        key.extend_from_slice(&digest);
    }
    key.truncate(len);
    key
}

/// A configured v3 user with localised keys
#[derive(Clone)]
pub struct LocalizedUser {
    pub user_name: String,
    pub engine_id: Vec<u8>,
    pub auth_protocol: AuthProtocol,
    auth_key: Vec<u8>,
    privacy: Option<(PrivProtocol, Vec<u8>)>,
}

impl std::fmt::Debug for LocalizedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizedUser")
            .field("user_name", &self.user_name)
            .field("engine_id", &hex::encode(&self.engine_id))
            .field("auth_protocol", &self.auth_protocol)
            .field("privacy", &self.privacy.as_ref().map(|(p, _)| p))
            .finish()
    }
}

impl LocalizedUser {
    pub fn new(
        user_name: &str,
        engine_id: &[u8],
        auth_protocol: AuthProtocol,
        auth_passphrase: &str,
        privacy: Option<(PrivProtocol, &str)>,
    ) -> Result<Self, SnmpError> {
        let auth_key = password_to_key(auth_protocol, auth_passphrase.as_bytes(), engine_id)?;

        // privacy keys are derived with the authentication hash
        let privacy = privacy
            .map(|(protocol, passphrase)| {
                password_to_key(auth_protocol, passphrase.as_bytes(), engine_id)
                    .map(|key| (protocol, extend_key(auth_protocol, key, protocol.key_len())))
            })
            .transpose()?;

        Ok(Self {
            user_name: user_name.to_string(),
            engine_id: engine_id.to_vec(),
            auth_protocol,
            auth_key,
            privacy,
        })
    }

    pub fn has_privacy(&self) -> bool {
        self.privacy.is_some()
    }

    fn mac_over(&self, message: &[u8]) -> Result<Vec<u8>, SnmpError> {
        let full = match self.auth_protocol {
            AuthProtocol::Md5 => {
                let mut mac = Hmac::<Md5>::new_from_slice(&self.auth_key)
                    .map_err(|e| SnmpError::Credentials(e.to_string()))?;
                mac.update(message);
                mac.finalize().into_bytes().to_vec()
            }
            AuthProtocol::Sha => {
                let mut mac = Hmac::<Sha1>::new_from_slice(&self.auth_key)
                    .map_err(|e| SnmpError::Credentials(e.to_string()))?;
                mac.update(message);
                mac.finalize().into_bytes().to_vec()
            }
        };
        Ok(full[..AUTH_PARAMS_LEN].to_vec())
    }

    /// Signature for `message`; its authentication parameters must be zeroed
    pub fn sign(&self, message: &[u8]) -> Result<[u8; AUTH_PARAMS_LEN], SnmpError> {
        let mac = self.mac_over(message)?;
        let mut out = [0u8; AUTH_PARAMS_LEN];
        out.copy_from_slice(&mac);
        Ok(out)
    }

    /// Verifies the truncated HMAC carried at `auth_offset` in `message`
    ///
    /// `auth_len` is the length of the received authentication parameters;
    /// anything but the 12-byte HMAC-96 digest is rejected.
    pub fn verify(&self, message: &[u8], auth_offset: usize, auth_len: usize) -> Result<(), SnmpError> {
        if auth_len != AUTH_PARAMS_LEN {
            return Err(SnmpError::Authentication(format!(
                "authentication parameters are {auth_len} bytes, expected {AUTH_PARAMS_LEN}"
            )));
        }
        let end = auth_offset + AUTH_PARAMS_LEN;
        let received = message
            .get(auth_offset..end)
            .ok_or_else(|| SnmpError::Authentication("authentication parameters truncated".into()))?;

        let mut zeroed = message.to_vec();
        zeroed[auth_offset..end].fill(0);

        let verified = match self.auth_protocol {
            AuthProtocol::Md5 => Hmac::<Md5>::new_from_slice(&self.auth_key)
                .map_err(|e| SnmpError::Credentials(e.to_string()))?
                .chain_update(&zeroed)
                .verify_truncated_left(received),
            AuthProtocol::Sha => Hmac::<Sha1>::new_from_slice(&self.auth_key)
                .map_err(|e| SnmpError::Credentials(e.to_string()))?
                .chain_update(&zeroed)
                .verify_truncated_left(received),
        };

        verified.map_err(|_| SnmpError::Authentication("HMAC mismatch".into()))
    }

    fn privacy(&self) -> Result<(PrivProtocol, &[u8]), SnmpError> {
        self.privacy
            .as_ref()
            .map(|(p, key)| (*p, key.as_slice()))
            .ok_or_else(|| SnmpError::Decryption("user has no privacy key".into()))
    }

    pub fn decrypt(
        &self,
        engine_boots: u32,
        engine_time: u32,
        salt: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, SnmpError> {
        if salt.len() != PRIV_PARAMS_LEN {
            return Err(SnmpError::Decryption(format!(
                "privacy parameters must be {PRIV_PARAMS_LEN} bytes, got {}",
                salt.len()
            )));
        }
        let (protocol, key) = self.privacy()?;
        let mut buf = ciphertext.to_vec();

        match protocol {
            PrivProtocol::Des => {
                if buf.len() % 8 != 0 {
                    return Err(SnmpError::Decryption(
                        "DES ciphertext is not a multiple of the block size".into(),
                    ));
                }
                let iv = des_iv(key, salt);
                DesCbcDec::new_from_slices(&key[..8], &iv)
                    .map_err(|e| SnmpError::Decryption(e.to_string()))?
                    .decrypt_padded_mut::<NoPadding>(&mut buf)
                    .map_err(|e| SnmpError::Decryption(e.to_string()))?;
            }
            PrivProtocol::Aes => {
                let iv = aes_iv(engine_boots, engine_time, salt);
                Aes128CfbDec::new_from_slices(key, &iv)
                    .map_err(|e| SnmpError::Decryption(e.to_string()))?
                    .decrypt(&mut buf);
            }
            PrivProtocol::Aes192 => {
                let iv = aes_iv(engine_boots, engine_time, salt);
                Aes192CfbDec::new_from_slices(key, &iv)
                    .map_err(|e| SnmpError::Decryption(e.to_string()))?
                    .decrypt(&mut buf);
            }
            PrivProtocol::Aes256 => {
                let iv = aes_iv(engine_boots, engine_time, salt);
                Aes256CfbDec::new_from_slices(key, &iv)
                    .map_err(|e| SnmpError::Decryption(e.to_string()))?
                    .decrypt(&mut buf);
            }
        }

        Ok(buf)
    }

    pub fn encrypt(
        &self,
        engine_boots: u32,
        engine_time: u32,
        salt: &[u8; PRIV_PARAMS_LEN],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, SnmpError> {
        let (protocol, key) = self.privacy()?;
        let mut buf = plaintext.to_vec();

        match protocol {
            PrivProtocol::Des => {
                let padded = buf.len().div_ceil(8) * 8;
                buf.resize(padded, 0);
                let iv = des_iv(key, salt);
                DesCbcEnc::new_from_slices(&key[..8], &iv)
                    .map_err(|e| SnmpError::Decryption(e.to_string()))?
                    .encrypt_padded_mut::<NoPadding>(&mut buf, padded)
                    .map_err(|e| SnmpError::Decryption(e.to_string()))?;
            }
            PrivProtocol::Aes => {
                let iv = aes_iv(engine_boots, engine_time, salt);
                Aes128CfbEnc::new_from_slices(key, &iv)
                    .map_err(|e| SnmpError::Decryption(e.to_string()))?
                    .encrypt(&mut buf);
            }
            PrivProtocol::Aes192 => {
                let iv = aes_iv(engine_boots, engine_time, salt);
                Aes192CfbEnc::new_from_slices(key, &iv)
                    .map_err(|e| SnmpError::Decryption(e.to_string()))?
                    .encrypt(&mut buf);
            }
            PrivProtocol::Aes256 => {
                let iv = aes_iv(engine_boots, engine_time, salt);
                Aes256CfbEnc::new_from_slices(key, &iv)
                    .map_err(|e| SnmpError::Decryption(e.to_string()))?
                    .encrypt(&mut buf);
            }
        }

        Ok(buf)
    }
}

fn des_iv(key: &[u8], salt: &[u8]) -> [u8; 8] {
    let mut iv = [0u8; 8];
    for (i, b) in iv.iter_mut().enumerate() {
        *b = key[8 + i] ^ salt[i];
    }
    iv
}

fn aes_iv(engine_boots: u32, engine_time: u32, salt: &[u8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
    iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
    iv[8..].copy_from_slice(&salt[..8]);
    iv
}
