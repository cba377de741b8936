//! Flash record layout of the persisted configuration.
//!
//! ```text
//! [magic u32][version u8][body_len u16][body ...][fnv1a32 over header+body]
//! body = [ns_len u8][namespace][count u8] { [name_len u8][name][kind u8][len u16][value] }*
//! ```
//!
//! Entries are named so older or newer firmware can skip what it does not
//! know. All integers are little endian.

use heapless::String;
use log::debug;

use crate::config::Configuration;

pub const RECORD_BYTES: usize = 512;
/// Flash is programmed in little-endian 32-bit words.
pub const RECORD_WORDS: usize = RECORD_BYTES / 4;
pub const NAMESPACE: &str = "config";

const RECORD_MAGIC: u32 = 0x3143_5A49; // "IZC1"
const RECORD_VERSION: u8 = 1;
const HEADER_LEN: usize = 7;
const CHECKSUM_LEN: usize = 4;

const KEY_SSID: &str = "ssid";
const KEY_PASSWORD: &str = "pwd";
const KEY_SERVER: &str = "url";
const KEY_PORT: &str = "port";
const KEY_RATE: &str = "rate";
const KEY_API_KEY: &str = "apikey";

const KIND_STR: u8 = 0;
const KIND_I32: u8 = 1;
const KIND_U64: u8 = 2;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RecordError {
    Overflow,
    Truncated,
    ChecksumMismatch,
    Unsupported,
    Corrupted,
}

struct Writer<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(out: &'a mut [u8], pos: usize) -> Self {
        Self { out, pos }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), RecordError> {
        let end = self.pos.checked_add(bytes.len()).ok_or(RecordError::Overflow)?;
        let slot = self.out.get_mut(self.pos..end).ok_or(RecordError::Overflow)?;
        slot.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_entry(&mut self, name: &str, kind: u8, value: &[u8]) -> Result<(), RecordError> {
        let value_len = u16::try_from(value.len()).map_err(|_| RecordError::Overflow)?;
        self.put(&[name.len() as u8])?;
        self.put(name.as_bytes())?;
        self.put(&[kind])?;
        self.put(&value_len.to_le_bytes())?;
        self.put(value)
    }
}

/// Serializes `config` into `out`, returning the number of bytes used.
pub fn encode(config: &Configuration, out: &mut [u8]) -> Result<usize, RecordError> {
    let mut writer = Writer::new(out, HEADER_LEN);
    writer.put(&[NAMESPACE.len() as u8])?;
    writer.put(NAMESPACE.as_bytes())?;
    writer.put(&[6])?;
    writer.put_entry(KEY_SSID, KIND_STR, config.ssid.as_bytes())?;
    writer.put_entry(KEY_PASSWORD, KIND_STR, config.password.as_bytes())?;
    writer.put_entry(KEY_SERVER, KIND_STR, config.server.as_bytes())?;
    writer.put_entry(KEY_PORT, KIND_I32, &config.port.to_le_bytes())?;
    writer.put_entry(KEY_RATE, KIND_U64, &config.refresh_rate_secs.to_le_bytes())?;
    writer.put_entry(KEY_API_KEY, KIND_STR, config.api_key.as_bytes())?;

    let body_end = writer.pos;
    let body_len = u16::try_from(body_end - HEADER_LEN).map_err(|_| RecordError::Overflow)?;
    let total = body_end + CHECKSUM_LEN;
    if out.len() < total {
        return Err(RecordError::Overflow);
    }

    out[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
    out[4] = RECORD_VERSION;
    out[5..7].copy_from_slice(&body_len.to_le_bytes());
    let checksum = checksum32(&out[..body_end]);
    out[body_end..total].copy_from_slice(&checksum.to_le_bytes());
    Ok(total)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], RecordError> {
        let end = self.pos.checked_add(len).ok_or(RecordError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(RecordError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, RecordError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, RecordError> {
        let raw = self.take(2)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

/// Parses a stored record.
///
/// Erased flash and foreign data decode as `Ok(None)`; so does a record that
/// lacks the network name or server address.
pub fn decode(bytes: &[u8]) -> Result<Option<Configuration>, RecordError> {
    if bytes.len() < HEADER_LEN || bytes.iter().all(|b| *b == 0xFF) {
        return Ok(None);
    }

    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != RECORD_MAGIC {
        return Ok(None);
    }
    if bytes[4] != RECORD_VERSION {
        return Err(RecordError::Unsupported);
    }

    let body_len = u16::from_le_bytes([bytes[5], bytes[6]]) as usize;
    let body_end = HEADER_LEN + body_len;
    let checksum_bytes = bytes
        .get(body_end..body_end + CHECKSUM_LEN)
        .ok_or(RecordError::Truncated)?;
    let expected = u32::from_le_bytes([
        checksum_bytes[0],
        checksum_bytes[1],
        checksum_bytes[2],
        checksum_bytes[3],
    ]);
    if checksum32(&bytes[..body_end]) != expected {
        return Err(RecordError::ChecksumMismatch);
    }

    let mut reader = Reader {
        bytes: &bytes[HEADER_LEN..body_end],
        pos: 0,
    };
    let ns_len = reader.byte()? as usize;
    if reader.take(ns_len)? != NAMESPACE.as_bytes() {
        return Ok(None);
    }

    let count = reader.byte()?;
    let mut config = Configuration::new();

    for _ in 0..count {
        let name_len = reader.byte()? as usize;
        let name = reader.take(name_len)?;
        let kind = reader.byte()?;
        let value_len = reader.u16()? as usize;
        let value = reader.take(value_len)?;

        match (name, kind) {
            (n, KIND_STR) if n == KEY_SSID.as_bytes() => config.ssid = to_string(value)?,
            (n, KIND_STR) if n == KEY_PASSWORD.as_bytes() => config.password = to_string(value)?,
            (n, KIND_STR) if n == KEY_SERVER.as_bytes() => config.server = to_string(value)?,
            (n, KIND_STR) if n == KEY_API_KEY.as_bytes() => config.api_key = to_string(value)?,
            (n, KIND_I32) if n == KEY_PORT.as_bytes() => {
                let raw: [u8; 4] = value.try_into().map_err(|_| RecordError::Corrupted)?;
                config.port = i32::from_le_bytes(raw);
            }
            (n, KIND_U64) if n == KEY_RATE.as_bytes() => {
                let raw: [u8; 8] = value.try_into().map_err(|_| RecordError::Corrupted)?;
                config.refresh_rate_secs = u64::from_le_bytes(raw);
            }
            _ => debug!("store: skipping unknown entry len={}", name_len),
        }
    }

    if !reader.is_empty() {
        return Err(RecordError::Corrupted);
    }

    Ok(config.is_valid().then_some(config))
}

fn to_string<const N: usize>(value: &[u8]) -> Result<String<N>, RecordError> {
    let text = core::str::from_utf8(value).map_err(|_| RecordError::Corrupted)?;
    let mut out = String::new();
    out.push_str(text).map_err(|_| RecordError::Corrupted)?;
    Ok(out)
}

fn checksum32(bytes: &[u8]) -> u32 {
    let mut hash = 0x811C9DC5u32;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Packs a record image into flash words.
pub fn to_words(bytes: &[u8; RECORD_BYTES]) -> [u32; RECORD_WORDS] {
    let mut words = [0u32; RECORD_WORDS];
    for (word, src) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
    }
    words
}

pub fn from_words(words: &[u32; RECORD_WORDS]) -> [u8; RECORD_BYTES] {
    let mut bytes = [0u8; RECORD_BYTES];
    for (dst, word) in bytes.chunks_exact_mut(4).zip(words.iter()) {
        dst.copy_from_slice(&word.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Configuration {
        let mut config = Configuration::new();
        config.ssid.push_str("home-net").unwrap();
        config.password.push_str("hunter22").unwrap();
        config.server.push_str("dashboard.lan").unwrap();
        config.port = 8080;
        config.refresh_rate_secs = 900;
        config.api_key.push_str("k-123").unwrap();
        config
    }

    #[test]
    fn stored_record_restores_every_field() {
        let mut buf = [0xFFu8; RECORD_BYTES];
        let used = encode(&sample(), &mut buf).unwrap();
        assert!(used < RECORD_BYTES);
        assert_eq!(decode(&buf), Ok(Some(sample())));
    }

    #[test]
    fn record_survives_word_programming() {
        let mut buf = [0xFFu8; RECORD_BYTES];
        let used = encode(&sample(), &mut buf).unwrap();

        let words = to_words(&buf);
        assert_eq!(words[0], RECORD_MAGIC);
        assert!(words[used.div_ceil(4)..].iter().all(|w| *w == u32::MAX));
        assert_eq!(decode(&from_words(&words)), Ok(Some(sample())));
    }

    #[test]
    fn erased_sector_has_no_configuration() {
        assert_eq!(decode(&[0xFFu8; RECORD_BYTES]), Ok(None));
    }

    #[test]
    fn foreign_magic_has_no_configuration() {
        let mut buf = [0u8; RECORD_BYTES];
        buf[0..4].copy_from_slice(b"RDS1");
        assert_eq!(decode(&buf), Ok(None));
    }

    #[test]
    fn flipped_byte_is_reported_as_checksum_mismatch() {
        let mut buf = [0xFFu8; RECORD_BYTES];
        encode(&sample(), &mut buf).unwrap();
        buf[20] ^= 0x01;
        assert_eq!(decode(&buf), Err(RecordError::ChecksumMismatch));
    }

    #[test]
    fn record_without_server_is_absent() {
        let mut config = sample();
        config.server.clear();
        let mut buf = [0xFFu8; RECORD_BYTES];
        encode(&config, &mut buf).unwrap();
        assert_eq!(decode(&buf), Ok(None));
    }

    #[test]
    fn missing_numeric_entries_fall_back_to_defaults() {
        let mut buf = [0xFFu8; RECORD_BYTES];
        let mut writer = Writer::new(&mut buf, HEADER_LEN);
        writer.put(&[NAMESPACE.len() as u8]).unwrap();
        writer.put(NAMESPACE.as_bytes()).unwrap();
        writer.put(&[2]).unwrap();
        writer.put_entry(KEY_SSID, KIND_STR, b"home").unwrap();
        writer.put_entry(KEY_SERVER, KIND_STR, b"10.0.0.2").unwrap();
        let body_end = writer.pos;
        buf[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        buf[4] = RECORD_VERSION;
        buf[5..7].copy_from_slice(&((body_end - HEADER_LEN) as u16).to_le_bytes());
        let checksum = checksum32(&buf[..body_end]);
        buf[body_end..body_end + 4].copy_from_slice(&checksum.to_le_bytes());

        let config = decode(&buf).unwrap().unwrap();
        assert_eq!(config.port, 80);
        assert_eq!(config.refresh_rate_secs, 60);
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn undersized_output_is_rejected() {
        let mut buf = [0u8; 32];
        assert_eq!(encode(&sample(), &mut buf), Err(RecordError::Overflow));
    }
}
