//! Key server credentials.
//!
//! A FairPlay key server holds an RSA 1024 private key (version 1 SPCs), an
//! RSA 2048 private key (version 2 SPCs) and the provisioning data blob
//! handed to the content key payload library. Credentials are loaded once
//! and shared read-only by every operation.

use std::fs;
use std::path::{Path, PathBuf};

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use serde::Deserialize;
use sha1::Sha1;
use sha2::Sha256;

use crate::constants::{AES128_KEY_SZ, SPC_VERSION_1, SPC_VERSION_2};
use crate::error::{Error, Result, Status};

/// Credential file locations, usually read from a YAML config.
///
/// ```yaml
/// rsa_1024_key: credentials/key1024.pem
/// rsa_2048_key: credentials/key2048.pem
/// provisioning_data: credentials/provisioning.bin
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    /// RSA 1024 private key (PEM or DER, PKCS#8 or PKCS#1).
    pub rsa_1024_key: Option<PathBuf>,
    /// RSA 2048 private key (PEM or DER, PKCS#8 or PKCS#1).
    pub rsa_2048_key: Option<PathBuf>,
    /// Provisioning data file.
    pub provisioning_data: Option<PathBuf>,
}

impl CredentialsConfig {
    /// Parse a YAML document.
    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// Resolve relative paths against `base`.
    #[must_use]
    pub fn relative_to(mut self, base: &Path) -> Self {
        let resolve = |path: Option<PathBuf>| {
            path.map(|p| if p.is_relative() { base.join(p) } else { p })
        };
        self.rsa_1024_key = resolve(self.rsa_1024_key);
        self.rsa_2048_key = resolve(self.rsa_2048_key);
        self.provisioning_data = resolve(self.provisioning_data);
        self
    }
}

/// Loaded credentials.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    rsa_1024: Option<RsaPrivateKey>,
    rsa_2048: Option<RsaPrivateKey>,
    provisioning_data: Vec<u8>,
}

impl Credentials {
    /// Create credentials from already loaded parts.
    #[must_use]
    pub fn new(
        rsa_1024: Option<RsaPrivateKey>,
        rsa_2048: Option<RsaPrivateKey>,
        provisioning_data: Vec<u8>,
    ) -> Self {
        Self {
            rsa_1024,
            rsa_2048,
            provisioning_data,
        }
    }

    /// Load every file named by `config`.
    pub fn load(config: &CredentialsConfig) -> Result<Self> {
        let rsa_1024 = config
            .rsa_1024_key
            .as_deref()
            .map(load_private_key)
            .transpose()?;
        let rsa_2048 = config
            .rsa_2048_key
            .as_deref()
            .map(load_private_key)
            .transpose()?;
        let provisioning_data = match config.provisioning_data.as_deref() {
            Some(path) => fs::read(path)?,
            None => Vec::new(),
        };

        if rsa_1024.is_none() && rsa_2048.is_none() {
            warn!("No RSA private key configured; every SPC will be rejected");
        }

        info!(
            "Loaded credentials (rsa1024: {}, rsa2048: {}, provisioning data: {} bytes)",
            rsa_1024.is_some(),
            rsa_2048.is_some(),
            provisioning_data.len()
        );

        Ok(Self::new(rsa_1024, rsa_2048, provisioning_data))
    }

    /// Provisioning data for the content key payload library.
    #[must_use]
    pub fn provisioning_data(&self) -> &[u8] {
        &self.provisioning_data
    }

    /// Private key matching an SPC container version.
    pub fn private_key(&self, spc_version: u32) -> Result<&RsaPrivateKey> {
        let key = match spc_version {
            SPC_VERSION_1 => self.rsa_1024.as_ref(),
            SPC_VERSION_2 => self.rsa_2048.as_ref(),
            _ => None,
        };
        match key {
            Some(key) => Ok(key),
            None => fps_bail!(
                Status::InvalidCertificateErr,
                "no private key for SPC version {}",
                spc_version
            ),
        }
    }

    /// Unwrap the SPC AES key with RSA-OAEP.
    ///
    /// Version 1 uses OAEP with SHA-1, version 2 uses OAEP with SHA-256.
    /// Only the first 16 bytes of the unwrapped key are used.
    pub fn unwrap_key(&self, spc_version: u32, wrapped_key: &[u8]) -> Result<[u8; AES128_KEY_SZ]> {
        fps_ensure!(!wrapped_key.is_empty(), Status::ParamErr, "empty wrapped key");

        let private_key = self.private_key(spc_version)?;
        let padding = if spc_version == SPC_VERSION_2 {
            Oaep::new::<Sha256>()
        } else {
            Oaep::new::<Sha1>()
        };

        let decrypted = match private_key.decrypt(padding, wrapped_key) {
            Ok(decrypted) => decrypted,
            // Most likely encrypted for another server certificate.
            Err(e) => fps_bail!(Status::InvalidCertificateErr, "RSA decryption failed: {}", e),
        };
        fps_ensure!(
            decrypted.len() >= AES128_KEY_SZ,
            Status::InvalidCertificateErr,
            "unwrapped key is only {} bytes",
            decrypted.len()
        );

        let mut key = [0u8; AES128_KEY_SZ];
        key.copy_from_slice(&decrypted[..AES128_KEY_SZ]);
        Ok(key)
    }
}

/// Parse an RSA private key from PEM or DER, PKCS#8 or PKCS#1.
pub fn parse_private_key(data: &[u8]) -> Result<RsaPrivateKey> {
    if let Ok(pem) = std::str::from_utf8(data) {
        if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
            return Ok(key);
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
            return Ok(key);
        }
    }

    if let Ok(key) = RsaPrivateKey::from_pkcs8_der(data) {
        return Ok(key);
    }
    Ok(RsaPrivateKey::from_pkcs1_der(data)?)
}

/// Read and parse an RSA private key file.
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey> {
    let data = fs::read(path)?;
    parse_private_key(&data).map_err(|e| {
        Error::Other(format!(
            "Failed to parse RSA private key {}: {}",
            path.display(),
            e
        ))
    })
}
