//! Shared fixtures for unit tests.

use std::sync::OnceLock;

use rsa::rand_core::OsRng;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;

use crate::constants::{tag, SPC_VERSION_2};
use crate::credentials::{parse_private_key, Credentials};
use crate::crypto::{aes_cbc_decrypt, aes_cbc_encrypt};
use crate::error::Result;
use crate::payload::{KeyPayload, KeyPayloadProvider, KeyPayloadRequest};
use crate::server::KeyServer;
use crate::tllv::Tllv;

pub const TEST_KEY_1024: &str = include_str!("../testdata/test_key_1024.pem");
pub const TEST_KEY_2048: &str = include_str!("../testdata/test_key_2048.pem");
pub const TEST_PROVISIONING: &[u8] = include_bytes!("../testdata/provisioning.bin");

/// Anti-replay seed placed in every built SPC.
pub const ANTI_REPLAY_SEED: [u8; 16] = [0x33; 16];

pub fn credentials() -> Credentials {
    static CREDENTIALS: OnceLock<Credentials> = OnceLock::new();
    CREDENTIALS
        .get_or_init(|| {
            Credentials::new(
                Some(parse_private_key(TEST_KEY_1024.as_bytes()).expect("1024 key")),
                Some(parse_private_key(TEST_KEY_2048.as_bytes()).expect("2048 key")),
                TEST_PROVISIONING.to_vec(),
            )
        })
        .clone()
}

pub fn server() -> KeyServer {
    KeyServer::new(credentials(), FakePayloadProvider)
}

/// Stand-in for the vendor key payload library.
pub struct FakePayloadProvider;

impl KeyPayloadProvider for FakePayloadProvider {
    fn create_key_payload(&self, _request: &KeyPayloadRequest<'_>) -> Result<KeyPayload> {
        Ok(fake_payload())
    }
}

pub fn fake_payload() -> KeyPayload {
    KeyPayload {
        hu: vec![0xab; 20],
        content_key_tag: 0x6e6f_6e65_6b65_7921,
        content_key_payload: vec![0x99; 32],
        r1: vec![0x5e; 44],
    }
}

/// Media playback state TLLV: first playback, playback id 42.
pub fn playback_state() -> Tllv {
    let mut value = Vec::new();
    value.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    value.extend_from_slice(&0xf4de_e5a2u32.to_be_bytes());
    value.extend_from_slice(&42u64.to_be_bytes());
    Tllv::new(tag::MEDIA_PLAYBACK_STATE, value)
}

/// Decrypt the body of a framed CKC.
pub fn open_ckc(ckc: &[u8], r1: &[u8], seed: &[u8]) -> Vec<u8> {
    let mut seed_block = [0u8; 16];
    seed_block.copy_from_slice(seed);
    let key = crate::ckc::derive_anti_replay_key(r1, &seed_block);

    let mut iv = [0u8; 16];
    iv.copy_from_slice(&ckc[8..24]);
    let len = u32::from_be_bytes([ckc[24], ckc[25], ckc[26], ckc[27]]) as usize;
    aes_cbc_decrypt(&key, &iv, &ckc[28..28 + len]).expect("ckc body")
}

/// Builds client-side SPCs encrypted to the test credentials.
#[derive(Debug, Clone)]
pub struct SpcBuilder {
    version: u32,
    tllvs: Vec<Tllv>,
}

impl SpcBuilder {
    /// Every required tag plus a capabilities TLLV with no flags.
    pub fn new() -> Self {
        let mut versions = Vec::new();
        versions.extend_from_slice(&1u32.to_be_bytes());

        Self {
            version: 1,
            tllvs: vec![
                Tllv::new(tag::SESSION_KEY_R1, vec![0x11; 112]),
                Tllv::new(tag::ANTI_REPLAY, ANTI_REPLAY_SEED.to_vec()),
                Tllv::new(tag::R2, vec![0x22; 21]),
                Tllv::new(tag::ASSET_ID, b"asset-0001".to_vec()),
                Tllv::new(tag::TRANSACTION_ID, 0x1122_3344_5566_7788u64.to_be_bytes().to_vec()),
                Tllv::new(tag::PROTOCOL_VERSION_USED, 1u32.to_be_bytes().to_vec()),
                Tllv::new(tag::PROTOCOL_VERSIONS_SUPPORTED, versions),
                Tllv::new(tag::RETURN_REQUEST, Vec::new()),
                Tllv::new(tag::SESSION_KEY_R1_INTEGRITY, vec![0x44; 16]),
                Tllv::new(tag::CAPABILITIES, vec![0u8; 16]),
            ],
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn tllvs(&self) -> &[Tllv] {
        &self.tllvs
    }

    pub fn push(mut self, tllv: Tllv) -> Self {
        self.tllvs.push(tllv);
        self
    }

    pub fn without(mut self, removed: u64) -> Self {
        self.tllvs.retain(|t| t.tag != removed);
        self
    }

    /// Replace the TLLV with the same tag, or append it.
    pub fn replace(mut self, tllv: Tllv) -> Self {
        match self.tllvs.iter_mut().find(|t| t.tag == tllv.tag) {
            Some(existing) => *existing = tllv,
            None => self.tllvs.push(tllv),
        }
        self
    }

    pub fn return_request(self, tags: &[u64]) -> Self {
        let value = tags.iter().flat_map(|t| t.to_be_bytes()).collect::<Vec<_>>();
        self.replace(Tllv::new(tag::RETURN_REQUEST, value))
    }

    pub fn capabilities(self, flags: u64) -> Self {
        let mut value = vec![0u8; 8];
        value.extend_from_slice(&flags.to_be_bytes());
        self.replace(Tllv::new(tag::CAPABILITIES, value))
    }

    /// Version 2 offline sync TLLV with title id `[0x77; 16]` and 100
    /// seconds to expiry.
    pub fn sync_v2(self, challenge: u64, flags: u64, deleted: &[[u8; 16]]) -> Self {
        let mut value = Vec::new();
        value.extend_from_slice(&2u32.to_be_bytes());
        value.extend_from_slice(&0u32.to_be_bytes());
        value.extend_from_slice(&challenge.to_be_bytes());
        value.extend_from_slice(&flags.to_be_bytes());
        value.extend_from_slice(&[0x77; 16]);
        value.extend_from_slice(&100u32.to_be_bytes());
        value.extend_from_slice(&(deleted.len() as u32).to_be_bytes());
        for id in deleted {
            value.extend_from_slice(id);
        }
        self.replace(Tllv::new(tag::OFFLINE_SYNC, value))
    }

    pub fn build(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        for tllv in &self.tllvs {
            tllv.write_to(&mut payload);
        }

        let key = [0x5a; 16];
        let iv = [0x0f; 16];
        let encrypted = aes_cbc_encrypt(&key, &iv, &payload).expect("encrypt payload");

        let creds = credentials();
        let wrapped = if self.version == SPC_VERSION_2 {
            RsaPublicKey::from(creds.private_key(2).expect("2048 key"))
                .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &key)
        } else {
            RsaPublicKey::from(creds.private_key(1).expect("1024 key"))
                .encrypt(&mut OsRng, Oaep::new::<Sha1>(), &key)
        }
        .expect("wrap key");

        let mut spc = Vec::new();
        spc.extend_from_slice(&self.version.to_be_bytes());
        spc.extend_from_slice(&0u32.to_be_bytes());
        spc.extend_from_slice(&iv);
        spc.extend_from_slice(&wrapped);
        spc.extend_from_slice(&[0xcc; 20]);
        spc.extend_from_slice(&(encrypted.len() as u32).to_be_bytes());
        spc.extend_from_slice(&encrypted);
        spc
    }
}
