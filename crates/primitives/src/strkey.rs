//! Stellar strkey codec: the base32 text encoding of ed25519 account ids
//! (`G…`), secret seeds (`S…`) and contract ids (`C…`).
//!
//! A strkey is `base32(version_byte || payload || crc16_xmodem_le)` with a
//! 32-byte payload, which always yields exactly 56 characters.

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

const VERSION_ACCOUNT: u8 = 6 << 3; // 'G'
const VERSION_SEED: u8 = 18 << 3; // 'S'
const VERSION_CONTRACT: u8 = 2 << 3; // 'C'

const ENCODED_LEN: usize = 56;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StrkeyError {
    #[error("strkey must be {ENCODED_LEN} characters, got {0}")]
    Length(usize),

    #[error("invalid base32 character {0:?}")]
    Character(char),

    #[error("strkey checksum mismatch")]
    Checksum,

    #[error("expected {expected} strkey, got one starting with {found:?}")]
    KeyType { expected: &'static str, found: char },
}

/// Encodes a raw ed25519 public key as a `G…` account strkey.
pub fn encode_account(key: &[u8; 32]) -> String {
    encode(VERSION_ACCOUNT, key)
}

/// Decodes a `G…` account strkey into the raw ed25519 public key.
pub fn decode_account(s: &str) -> Result<[u8; 32], StrkeyError> {
    decode(VERSION_ACCOUNT, "account", s)
}

/// Encodes a raw ed25519 secret seed as an `S…` strkey.
pub fn encode_seed(seed: &[u8; 32]) -> String {
    encode(VERSION_SEED, seed)
}

/// Decodes an `S…` strkey into the raw ed25519 secret seed.
pub fn decode_seed(s: &str) -> Result<[u8; 32], StrkeyError> {
    decode(VERSION_SEED, "seed", s)
}

/// Encodes a raw 32-byte contract id as a `C…` strkey.
pub fn encode_contract(id: &[u8; 32]) -> String {
    encode(VERSION_CONTRACT, id)
}

/// Decodes a `C…` contract strkey into the raw 32-byte contract id.
pub fn decode_contract(s: &str) -> Result<[u8; 32], StrkeyError> {
    decode(VERSION_CONTRACT, "contract", s)
}

fn encode(version: u8, payload: &[u8; 32]) -> String {
    let mut data = Vec::with_capacity(35);
    data.push(version);
    data.extend_from_slice(payload);
    let crc = crc16_xmodem(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    base32_encode(&data)
}

fn decode(version: u8, kind: &'static str, s: &str) -> Result<[u8; 32], StrkeyError> {
    if s.len() != ENCODED_LEN {
        return Err(StrkeyError::Length(s.len()));
    }

    let data = base32_decode(s)?;
    debug_assert_eq!(data.len(), 35);

    let (body, checksum) = data.split_at(33);
    let expected = crc16_xmodem(body).to_le_bytes();
    if checksum != expected {
        return Err(StrkeyError::Checksum);
    }

    if body[0] != version {
        return Err(StrkeyError::KeyType {
            expected: kind,
            // checksum passed, so the first character is well-formed
            found: s.chars().next().unwrap_or('?'),
        });
    }

    let mut payload = [0u8; 32];
    payload.copy_from_slice(&body[1..]);
    Ok(payload)
}

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 8 / 5 + 1);
    let mut buffer = 0u32;
    let mut bits = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }

    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}

fn base32_decode(s: &str) -> Result<Vec<u8>, StrkeyError> {
    let mut out = Vec::with_capacity(s.len() * 5 / 8);
    let mut buffer = 0u32;
    let mut bits = 0u32;

    for c in s.chars() {
        let value = match c {
            'A'..='Z' => c as u32 - 'A' as u32,
            '2'..='7' => c as u32 - '2' as u32 + 26,
            other => return Err(StrkeyError::Character(other)),
        };

        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }

    Ok(out)
}

fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn account_round_trip() {
        let key = [0x3fu8; 32];
        let encoded = encode_account(&key);
        assert_eq!(encoded.len(), 56);
        assert!(encoded.starts_with('G'));
        assert_eq!(decode_account(&encoded).unwrap(), key);
    }

    #[test]
    fn seed_round_trip() {
        let seed: [u8; 32] = core::array::from_fn(|i| i as u8);
        let encoded = encode_seed(&seed);
        assert!(encoded.starts_with('S'));
        assert_eq!(decode_seed(&encoded).unwrap(), seed);
    }

    #[test]
    fn contract_round_trip() {
        let id = [0xeeu8; 32];
        let encoded = encode_contract(&id);
        assert!(encoded.starts_with('C'));
        assert_eq!(decode_contract(&encoded).unwrap(), id);
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let mut encoded = encode_account(&[1u8; 32]).into_bytes();
        // flip a character in the middle of the payload
        encoded[20] = if encoded[20] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(encoded).unwrap();
        assert_matches!(decode_account(&corrupted), Err(StrkeyError::Checksum));
    }

    #[test]
    fn wrong_key_type_rejected() {
        let seed = encode_seed(&[9u8; 32]);
        assert_matches!(
            decode_account(&seed),
            Err(StrkeyError::KeyType { expected: "account", found: 'S' })
        );
    }

    #[test]
    fn bad_length_rejected() {
        assert_matches!(decode_account("GAAA"), Err(StrkeyError::Length(4)));
    }

    #[test]
    fn bad_character_rejected() {
        let mut encoded = encode_account(&[1u8; 32]);
        encoded.replace_range(10..11, "0"); // '0' is not in the base32 alphabet
        assert_matches!(decode_account(&encoded), Err(StrkeyError::Character('0')));
    }
}
