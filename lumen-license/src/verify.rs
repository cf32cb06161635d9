//! Ed25519 verification of clear-signed licenses against the trusted key.

use crate::armor::ClearSignDocument;
use crate::error::{LicenseError, LicenseResult};
use crate::packet::PublicKeyAlgorithm;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tracing::debug;

/// Embedded Ed25519 public key of the license issuer (32 bytes).
const LICENSE_PUBLIC_KEY: [u8; 32] = [
    108, 133, 127, 182, 180, 207, 75, 92, 106, 121, 18, 157, 244, 129, 66, 144,
    93, 139, 30, 144, 253, 97, 144, 113, 246, 106, 132, 134, 96, 71, 2, 249,
];

/// The single public key licenses are accepted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedKey(VerifyingKey);

impl TrustedKey {
    /// Returns the key compiled into the application.
    ///
    /// # Errors
    ///
    /// Fails only if the embedded bytes are not a valid Ed25519 point.
    pub fn embedded() -> LicenseResult<Self> {
        Self::from_bytes(&LICENSE_PUBLIC_KEY)
    }

    /// Builds a trusted key from raw public key bytes.
    /// Used for testing with a generated key pair.
    pub fn from_bytes(bytes: &[u8; 32]) -> LicenseResult<Self> {
        VerifyingKey::from_bytes(bytes).map(Self).map_err(|_| {
            LicenseError::SignatureVerificationFailed("invalid trusted public key".to_string())
        })
    }

    /// Returns the raw 32-byte public key.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Verifies the document's first signature over its normalized text.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::SignatureVerificationFailed`] if the signature
    /// was not made by this key over exactly the normalized text.
    pub fn verify(&self, document: &ClearSignDocument) -> LicenseResult<()> {
        let packet = document.signature();

        if let PublicKeyAlgorithm::Other(id) = packet.public_key_algorithm() {
            return Err(LicenseError::SignatureVerificationFailed(format!(
                "signature uses public-key algorithm {id}, expected Ed25519"
            )));
        }

        debug!(
            hash = packet.hash_algorithm().armor_name(),
            created_at = ?packet.created_at(),
            "verifying license signature"
        );

        let digest = packet.digest(document.text().as_bytes());
        if digest[..2] != packet.hash_prefix() {
            return Err(LicenseError::SignatureVerificationFailed(
                "signature does not match".to_string(),
            ));
        }

        let signature = Signature::from_bytes(packet.signature_bytes());
        self.0
            .verify(&digest, &signature)
            .map_err(|_| LicenseError::SignatureVerificationFailed("signature does not match".to_string()))
    }
}
