mod common;

use common::{armor, clear_sign, license_text, other_keypair, signature_packet, test_keypair};
use lumen_license::{ClearSignDocument, LicenseError, TrustedKey};

fn verify(doc: &str, key: &TrustedKey) -> Result<(), LicenseError> {
    let parsed = ClearSignDocument::parse(doc.as_bytes())?;
    key.verify(&parsed)
}

fn assert_rejected(result: Result<(), LicenseError>) {
    match result {
        Err(LicenseError::SignatureVerificationFailed(_)) => {}
        other => panic!("expected SignatureVerificationFailed, got {other:?}"),
    }
}

#[test]
fn valid_signature_verifies() {
    let (sk, pk) = test_keypair();
    let doc = clear_sign(&sk, &license_text(1234, "2031-01-31"));
    assert!(verify(&doc, &pk).is_ok());
}

#[test]
fn embedded_key_is_a_valid_point() {
    let key = TrustedKey::embedded().unwrap();
    let (_, test_key) = test_keypair();
    assert_ne!(key, test_key);
}

#[test]
fn embedded_key_rejects_test_signatures() {
    let (sk, _) = test_keypair();
    let doc = clear_sign(&sk, &license_text(1, "2031-01-31"));
    assert_rejected(verify(&doc, &TrustedKey::embedded().unwrap()));
}

#[test]
fn signature_from_untrusted_key_is_rejected() {
    let (_, pk) = test_keypair();
    let (other, _) = other_keypair();
    let doc = clear_sign(&other, &license_text(1234, "2031-01-31"));
    assert_rejected(verify(&doc, &pk));
}

#[test]
fn tampered_text_is_rejected() {
    let (sk, pk) = test_keypair();
    let doc = clear_sign(&sk, &license_text(1234, "2031-01-31"));
    let tampered = doc.replace("Valid-Until: 2031-01-31", "Valid-Until: 2099-01-31");
    assert_rejected(verify(&tampered, &pk));
}

#[test]
fn added_line_is_rejected() {
    let (sk, pk) = test_keypair();
    let text = license_text(1234, "2031-01-31");
    let packet = signature_packet(&sk, &text);
    let doc = armor(&format!("{text}Seats: 100\n"), &packet);
    assert_rejected(verify(&doc, &pk));
}

#[test]
fn whitespace_and_line_endings_do_not_matter() {
    let (sk, pk) = test_keypair();
    let text = license_text(1234, "2031-01-31");
    let packet = signature_packet(&sk, &text);

    let reformatted = "  Product: Lumen\t\nName: Test User   \n   Order: 1234\nValid-Until: 2031-01-31\n\n\n";
    assert!(verify(&armor(reformatted, &packet), &pk).is_ok());

    let crlf = armor(&text, &packet).replace('\n', "\r\n");
    assert!(verify(&crlf, &pk).is_ok());
}

#[test]
fn corrupted_signature_is_rejected() {
    let (sk, pk) = test_keypair();
    let text = license_text(1234, "2031-01-31");
    let mut packet = signature_packet(&sk, &text);
    let last = packet.len() - 1;
    packet[last] ^= 0x01;
    assert_rejected(verify(&armor(&text, &packet), &pk));
}

#[test]
fn hash_prefix_mismatch_is_rejected() {
    let (sk, pk) = test_keypair();
    let text = license_text(1234, "2031-01-31");
    let mut packet = signature_packet(&sk, &text);
    // header(2) + version..hashed len(6) + creation time subpacket(6) + unhashed len(2)
    packet[16] ^= 0xff;
    assert_rejected(verify(&armor(&text, &packet), &pk));
}

#[test]
fn non_ed25519_signature_is_rejected() {
    let (sk, pk) = test_keypair();
    let text = license_text(1234, "2031-01-31");
    let mut packet = signature_packet(&sk, &text);
    // public-key algorithm 1 (RSA)
    packet[4] = 1;
    assert_rejected(verify(&armor(&text, &packet), &pk));
}
