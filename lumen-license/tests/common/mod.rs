//! Shared test helpers for license tests.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey};
use lumen_license::{crc24, normalize_text, MemoryCache, RevalidationConfig, Revalidator, TrustedKey};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Signature creation time written into test signatures.
const CREATED_AT: u32 = 1_717_200_000;

/// Returns a deterministic Ed25519 key pair from a fixed seed.
pub fn test_keypair() -> (SigningKey, TrustedKey) {
    keypair_from_seed(std::array::from_fn(|i| i as u8 + 1))
}

/// A second key pair that is not trusted by the tests.
pub fn other_keypair() -> (SigningKey, TrustedKey) {
    keypair_from_seed([42; 32])
}

fn keypair_from_seed(seed: [u8; 32]) -> (SigningKey, TrustedKey) {
    let signing_key = SigningKey::from_bytes(&seed);
    let trusted = TrustedKey::from_bytes(&signing_key.verifying_key().to_bytes()).unwrap();
    (signing_key, trusted)
}

/// Builds a v4 EdDSA/SHA-256 text signature packet over the normalized text.
pub fn signature_packet(signing_key: &SigningKey, text: &str) -> Vec<u8> {
    let normalized = normalize_text(text);

    let mut subpacket = vec![5, 2];
    subpacket.extend_from_slice(&CREATED_AT.to_be_bytes());

    // version, text signature, EdDSA, SHA-256
    let mut body = vec![4, 0x01, 22, 8];
    body.extend_from_slice(&(subpacket.len() as u16).to_be_bytes());
    body.extend_from_slice(&subpacket);

    let mut trailer = body.clone();
    trailer.extend_from_slice(&[0x04, 0xff]);
    trailer.extend_from_slice(&(body.len() as u32).to_be_bytes());

    let digest = Sha256::new()
        .chain_update(normalized.as_bytes())
        .chain_update(&trailer)
        .finalize();
    let signature = signing_key.sign(&digest).to_bytes();

    // no unhashed subpackets
    body.extend_from_slice(&[0, 0]);
    body.extend_from_slice(&digest[..2]);
    push_mpi(&mut body, &signature[..32]);
    push_mpi(&mut body, &signature[32..]);

    let mut packet = vec![0xc0 | 2];
    push_new_format_len(&mut packet, body.len());
    packet.extend_from_slice(&body);
    packet
}

/// Creates a clear-signed license document for `text`.
pub fn clear_sign(signing_key: &SigningKey, text: &str) -> String {
    armor(text, &signature_packet(signing_key, text))
}

/// Wraps text and a binary packet stream in cleartext armor.
pub fn armor(text: &str, packets: &[u8]) -> String {
    let mut out = String::from("-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\n");
    for line in text.lines() {
        if line.starts_with('-') {
            out.push_str("- ");
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("-----BEGIN PGP SIGNATURE-----\nComment: test signature\n\n");

    let encoded = STANDARD.encode(packets);
    for chunk in encoded.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(chunk).unwrap());
        out.push('\n');
    }
    out.push('=');
    out.push_str(&STANDARD.encode(&crc24(packets).to_be_bytes()[1..]));
    out.push('\n');
    out.push_str("-----END PGP SIGNATURE-----\n");
    out
}

/// Standard license text with the given id and Valid-Until date.
pub fn license_text(order: i64, valid_until: &str) -> String {
    format!("Product: Lumen\nName: Test User\nOrder: {order}\nValid-Until: {valid_until}\n")
}

/// A signed license from the trusted test key.
pub fn signed_license(order: i64, valid_until: &str) -> Vec<u8> {
    let (sk, _) = test_keypair();
    clear_sign(&sk, &license_text(order, valid_until)).into_bytes()
}

/// A revalidator pointed at `base_url` with an in-memory cache.
pub fn revalidator(base_url: &str) -> (Revalidator, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::new());
    let config = RevalidationConfig {
        base_url: base_url.to_string(),
        ..Default::default()
    };
    let revalidator = Revalidator::new(config, cache.clone()).unwrap();
    (revalidator, cache)
}

fn push_mpi(out: &mut Vec<u8>, value: &[u8]) {
    let start = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    let value = &value[start..];
    let bits = match value.first() {
        Some(&first) => (value.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
        None => 0,
    };
    out.extend_from_slice(&(bits as u16).to_be_bytes());
    out.extend_from_slice(value);
}

fn push_new_format_len(out: &mut Vec<u8>, len: usize) {
    if len < 192 {
        out.push(len as u8);
    } else {
        let len = len - 192;
        out.push((len >> 8) as u8 + 192);
        out.push(len as u8);
    }
}
