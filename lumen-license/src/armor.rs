//! Clear-signed message parsing.
//!
//! A license is an ASCII-armored clear-signed message:
//!
//! ```text
//! -----BEGIN PGP SIGNED MESSAGE-----
//! Hash: SHA256
//!
//! Order: 1234
//! Valid-Until: 2031-01-31
//! -----BEGIN PGP SIGNATURE-----
//!
//! iHUEARYIAB0WIQ...
//! =Xy1z
//! -----END PGP SIGNATURE-----
//! ```
//!
//! The cleartext is normalized before it is verified: every line is trimmed
//! and the lines are joined with CRLF. The signature must have been made over
//! exactly that form.

use crate::error::{LicenseError, LicenseResult};
use crate::packet::SignaturePacket;
use base64::{engine::general_purpose::STANDARD, Engine};

const BEGIN_MESSAGE: &[u8] = b"-----BEGIN PGP SIGNED MESSAGE-----";
const BEGIN_SIGNATURE: &[u8] = b"-----BEGIN PGP SIGNATURE-----";
const END_SIGNATURE: &[u8] = b"-----END PGP SIGNATURE-----";

const CRC24_INIT: u32 = 0x00b7_04ce;
const CRC24_POLY: u32 = 0x0186_4cfb;

/// A parsed clear-signed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearSignDocument {
    text: String,
    hash_headers: Vec<String>,
    signature: SignaturePacket,
}

impl ClearSignDocument {
    /// Parses an armored clear-signed message.
    ///
    /// Only the first signature packet of the signature block is kept.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedDocument`] for a missing or truncated
    /// armor section, undecodable text, a bad checksum or a missing signature.
    pub fn parse(bytes: &[u8]) -> LicenseResult<Self> {
        let mut lines = bytes.split(|&b| b == b'\n').map(strip_cr);

        // Anything before the message header is ignored.
        lines
            .by_ref()
            .find(|line| line.trim_ascii_end() == BEGIN_MESSAGE)
            .ok_or_else(|| LicenseError::malformed("missing signed message header"))?;

        let mut hash_headers = Vec::new();
        for header in armor_headers(&mut lines, "signed message")? {
            if let Some(names) = header.strip_prefix("Hash:") {
                hash_headers.extend(
                    names
                        .split(',')
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string),
                );
            }
        }

        let mut content = Vec::with_capacity(bytes.len());
        let mut first = true;
        let mut reached_signature = false;
        for line in lines.by_ref() {
            if line.starts_with(BEGIN_SIGNATURE) {
                reached_signature = true;
                break;
            }
            if !first {
                content.push(b'\n');
            }
            first = false;
            content.extend_from_slice(line.strip_prefix(b"- ").unwrap_or(line));
        }
        if !reached_signature {
            return Err(LicenseError::malformed("missing signature block"));
        }

        let text = std::str::from_utf8(&content)
            .map_err(|e| LicenseError::malformed(format!("license text is not UTF-8: {e}")))?;
        let text = normalize_text(text);

        armor_headers(&mut lines, "signature")?;

        let mut body = String::new();
        let mut checksum = None;
        let mut reached_end = false;
        for line in lines {
            let line = std::str::from_utf8(line)
                .map_err(|_| LicenseError::malformed("signature armor is not ASCII"))?
                .trim();
            if line.as_bytes().starts_with(END_SIGNATURE) {
                reached_end = true;
                break;
            }
            if let Some(crc) = line.strip_prefix('=') {
                checksum = Some(crc.to_string());
            } else {
                body.push_str(line);
            }
        }
        if !reached_end {
            return Err(LicenseError::malformed("truncated signature block"));
        }

        let packets = STANDARD
            .decode(body.as_bytes())
            .map_err(|e| LicenseError::malformed(format!("invalid signature base64: {e}")))?;

        if let Some(checksum) = checksum {
            let expected = STANDARD
                .decode(checksum.as_bytes())
                .map_err(|e| LicenseError::malformed(format!("invalid armor checksum: {e}")))?;
            if expected.as_slice() != &crc24(&packets).to_be_bytes()[1..] {
                return Err(LicenseError::malformed("armor checksum mismatch"));
            }
        }

        let signature = SignaturePacket::first_in(&packets)?;

        Ok(Self {
            text,
            hash_headers,
            signature,
        })
    }

    /// The normalized, CRLF-joined cleartext.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Hash algorithm names announced in the `Hash:` armor header.
    #[must_use]
    pub fn hash_headers(&self) -> &[String] {
        &self.hash_headers
    }

    /// The first signature of the signature block.
    #[must_use]
    pub fn signature(&self) -> &SignaturePacket {
        &self.signature
    }
}

/// Normalizes cleartext for signing and verification.
///
/// Splits on any line terminator (`\r\n`, `\n` or `\r`), trims each line,
/// drops trailing empty lines and joins the rest with `\r\n`.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let mut lines: Vec<&str> = split_lines(text).map(str::trim).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\r\n")
}

/// Splits text on `\r\n`, `\n` and lone `\r`.
pub(crate) fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(text);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.find(['\r', '\n']) {
            Some(i) => {
                let skip = if current[i..].starts_with("\r\n") { 2 } else { 1 };
                rest = Some(&current[i + skip..]);
                Some(&current[..i])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

/// CRC-24 checksum used by ASCII armor (RFC 4880 section 6.1).
#[must_use]
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for &byte in data {
        crc ^= u32::from(byte) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00ff_ffff
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Consumes `Key: Value` armor headers up to and including the blank line.
fn armor_headers<'a>(
    lines: &mut impl Iterator<Item = &'a [u8]>,
    section: &str,
) -> LicenseResult<Vec<String>> {
    let mut headers = Vec::new();
    for line in lines {
        let line = std::str::from_utf8(line)
            .map_err(|_| LicenseError::malformed(format!("{section} headers are not UTF-8")))?
            .trim();
        if line.is_empty() {
            return Ok(headers);
        }
        if !line.contains(": ") && !line.ends_with(':') {
            return Err(LicenseError::malformed(format!(
                "invalid {section} armor header: {line}"
            )));
        }
        headers.push(line.to_string());
    }
    Err(LicenseError::malformed(format!("truncated {section} armor")))
}
