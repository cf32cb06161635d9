//! OpenPGP signature packet decoding (RFC 4880 section 5.2).
//!
//! Only what a license signature needs: version 4 packets made with an
//! Ed25519 key over one of the SHA-2 hashes. Everything else is rejected.

use crate::error::{LicenseError, LicenseResult};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

const TAG_SIGNATURE: u8 = 2;

const SUBPACKET_CREATION_TIME: u8 = 2;
const SUBPACKET_ISSUER: u8 = 16;

/// Public-key algorithm of a signature packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyAlgorithm {
    /// EdDSA over Ed25519, legacy encoding with two MPIs (id 22).
    EdDsaLegacy,
    /// Ed25519 with native 64-byte signatures (id 27).
    Ed25519,
    /// Any other algorithm id; never verifiable by the trusted key.
    Other(u8),
}

impl From<u8> for PublicKeyAlgorithm {
    fn from(id: u8) -> Self {
        match id {
            22 => Self::EdDsaLegacy,
            27 => Self::Ed25519,
            other => Self::Other(other),
        }
    }
}

/// Hash algorithm of a signature packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    fn from_id(id: u8) -> LicenseResult<Self> {
        match id {
            8 => Ok(Self::Sha256),
            9 => Ok(Self::Sha384),
            10 => Ok(Self::Sha512),
            11 => Ok(Self::Sha224),
            other => Err(LicenseError::malformed(format!(
                "unsupported hash algorithm {other}"
            ))),
        }
    }

    /// Name as used in the `Hash:` armor header.
    #[must_use]
    pub fn armor_name(&self) -> &'static str {
        match self {
            Self::Sha224 => "SHA224",
            Self::Sha256 => "SHA256",
            Self::Sha384 => "SHA384",
            Self::Sha512 => "SHA512",
        }
    }

    /// Hashes the concatenation of `parts`.
    #[must_use]
    pub fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }

        match self {
            Self::Sha224 => run::<Sha224>(parts),
            Self::Sha256 => run::<Sha256>(parts),
            Self::Sha384 => run::<Sha384>(parts),
            Self::Sha512 => run::<Sha512>(parts),
        }
    }
}

/// A decoded version 4 signature packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePacket {
    signature_type: u8,
    public_key_algorithm: PublicKeyAlgorithm,
    hash_algorithm: HashAlgorithm,
    /// Version byte through the end of the hashed subpacket area.
    hashed: Vec<u8>,
    hash_prefix: [u8; 2],
    signature: [u8; 64],
    created_at: Option<u32>,
    issuer: Option<[u8; 8]>,
}

impl SignaturePacket {
    /// Returns the first signature packet in a binary packet stream.
    ///
    /// Packets of other types before it are skipped; packets after it are
    /// not inspected.
    pub fn first_in(mut data: &[u8]) -> LicenseResult<Self> {
        while !data.is_empty() {
            let (tag, body, rest) = split_packet(data)?;
            if tag == TAG_SIGNATURE {
                return Self::decode(body);
            }
            data = rest;
        }
        Err(LicenseError::malformed("no signature packet found"))
    }

    /// Decodes the body of a signature packet.
    pub fn decode(body: &[u8]) -> LicenseResult<Self> {
        let mut r = Reader::new(body);

        let version = r.u8()?;
        if version != 4 {
            return Err(LicenseError::malformed(format!(
                "unsupported signature packet version {version}"
            )));
        }

        let signature_type = r.u8()?;
        if signature_type > 0x01 {
            return Err(LicenseError::malformed(format!(
                "unexpected signature type 0x{signature_type:02x}"
            )));
        }

        let public_key_algorithm = PublicKeyAlgorithm::from(r.u8()?);
        let hash_algorithm = HashAlgorithm::from_id(r.u8()?)?;

        let hashed_len = usize::from(r.u16()?);
        let hashed_area = r.take(hashed_len)?;
        let hashed = body[..6 + hashed_len].to_vec();

        let unhashed_len = usize::from(r.u16()?);
        let unhashed_area = r.take(unhashed_len)?;

        let mut hash_prefix = [0u8; 2];
        hash_prefix.copy_from_slice(r.take(2)?);

        let signature = match public_key_algorithm {
            PublicKeyAlgorithm::EdDsaLegacy => {
                let mut sig = [0u8; 64];
                sig[..32].copy_from_slice(&r.mpi_padded::<32>()?);
                sig[32..].copy_from_slice(&r.mpi_padded::<32>()?);
                sig
            }
            PublicKeyAlgorithm::Ed25519 => {
                let mut sig = [0u8; 64];
                sig.copy_from_slice(r.take(64)?);
                sig
            }
            // Kept so the verifier can report the algorithm mismatch.
            PublicKeyAlgorithm::Other(_) => [0u8; 64],
        };

        let mut packet = Self {
            signature_type,
            public_key_algorithm,
            hash_algorithm,
            hashed,
            hash_prefix,
            signature,
            created_at: None,
            issuer: None,
        };
        packet.read_subpackets(hashed_area)?;
        packet.read_subpackets(unhashed_area)?;
        Ok(packet)
    }

    fn read_subpackets(&mut self, mut area: &[u8]) -> LicenseResult<()> {
        while !area.is_empty() {
            let mut r = Reader::new(area);
            let len = r.subpacket_len()?;
            if len == 0 {
                return Err(LicenseError::malformed("empty signature subpacket"));
            }
            let sub = r.take(len)?;
            // Top bit is the "critical" flag.
            let kind = sub[0] & 0x7f;
            let data = &sub[1..];
            match kind {
                SUBPACKET_CREATION_TIME if data.len() == 4 => {
                    self.created_at = Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
                }
                SUBPACKET_ISSUER if data.len() == 8 => {
                    let mut id = [0u8; 8];
                    id.copy_from_slice(data);
                    self.issuer.get_or_insert(id);
                }
                _ => {}
            }
            area = r.rest();
        }
        Ok(())
    }

    /// Signature type (0x00 binary document, 0x01 canonical text).
    #[must_use]
    pub fn signature_type(&self) -> u8 {
        self.signature_type
    }

    #[must_use]
    pub fn public_key_algorithm(&self) -> PublicKeyAlgorithm {
        self.public_key_algorithm
    }

    #[must_use]
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    /// Left 16 bits of the signed hash, as stored in the packet.
    #[must_use]
    pub fn hash_prefix(&self) -> [u8; 2] {
        self.hash_prefix
    }

    /// Raw `R || S` Ed25519 signature.
    #[must_use]
    pub fn signature_bytes(&self) -> &[u8; 64] {
        &self.signature
    }

    /// Signature creation time (seconds since epoch), if present.
    #[must_use]
    pub fn created_at(&self) -> Option<u32> {
        self.created_at
    }

    /// Issuer key id, if present.
    #[must_use]
    pub fn issuer(&self) -> Option<[u8; 8]> {
        self.issuer
    }

    /// Bytes appended to the document before hashing.
    #[must_use]
    pub fn hash_trailer(&self) -> Vec<u8> {
        let mut trailer = Vec::with_capacity(self.hashed.len() + 6);
        trailer.extend_from_slice(&self.hashed);
        trailer.extend_from_slice(&[0x04, 0xff]);
        trailer.extend_from_slice(&(self.hashed.len() as u32).to_be_bytes());
        trailer
    }

    /// Digest the signature was made over, for the given document bytes.
    #[must_use]
    pub fn digest(&self, document: &[u8]) -> Vec<u8> {
        self.hash_algorithm
            .digest(&[document, &self.hash_trailer()])
    }
}

/// Splits one packet off the front of `data`: `(tag, body, rest)`.
fn split_packet(data: &[u8]) -> LicenseResult<(u8, &[u8], &[u8])> {
    let mut r = Reader::new(data);
    let header = r.u8()?;
    if header & 0x80 == 0 {
        return Err(LicenseError::malformed("invalid packet header"));
    }

    let (tag, len) = if header & 0x40 != 0 {
        // New format
        let tag = header & 0x3f;
        let first = r.u8()?;
        let len = match first {
            0..=191 => usize::from(first),
            192..=223 => ((usize::from(first) - 192) << 8) + usize::from(r.u8()?) + 192,
            255 => r.u32()? as usize,
            _ => return Err(LicenseError::malformed("partial packet lengths are not supported")),
        };
        (tag, len)
    } else {
        // Old format
        let tag = (header >> 2) & 0x0f;
        let len = match header & 0x03 {
            0 => usize::from(r.u8()?),
            1 => usize::from(r.u16()?),
            2 => r.u32()? as usize,
            _ => r.rest().len(),
        };
        (tag, len)
    };

    let body = r.take(len)?;
    Ok((tag, body, r.rest()))
}

/// Bounds-checked big-endian reader.
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, n: usize) -> LicenseResult<&'a [u8]> {
        if self.data.len() < n {
            return Err(LicenseError::malformed("truncated signature packet"));
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn rest(&self) -> &'a [u8] {
        self.data
    }

    fn u8(&mut self) -> LicenseResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> LicenseResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> LicenseResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn subpacket_len(&mut self) -> LicenseResult<usize> {
        let first = self.u8()?;
        Ok(match first {
            0..=191 => usize::from(first),
            192..=254 => ((usize::from(first) - 192) << 8) + usize::from(self.u8()?) + 192,
            255 => self.u32()? as usize,
        })
    }

    /// Reads an MPI and left-pads it to `N` bytes.
    fn mpi_padded<const N: usize>(&mut self) -> LicenseResult<[u8; N]> {
        let bits = usize::from(self.u16()?);
        let bytes = self.take(bits.div_ceil(8))?;
        if bytes.len() > N {
            return Err(LicenseError::malformed("signature integer too large"));
        }
        let mut out = [0u8; N];
        out[N - bytes.len()..].copy_from_slice(bytes);
        Ok(out)
    }
}
