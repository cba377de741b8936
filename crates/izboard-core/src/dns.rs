//! Captive DNS: every A query resolves to the portal address.

use log::debug;

pub const DNS_PORT: u16 = 53;
pub const ANSWER_TTL_SECS: u32 = 60;

const HEADER_LEN: usize = 12;
const TYPE_A: u16 = 1;
const TYPE_ANY: u16 = 255;
const CLASS_IN: u16 = 1;

const FLAG_RESPONSE: u16 = 0x8000;
const FLAG_AUTHORITATIVE: u16 = 0x0400;
const FLAG_RECURSION_DESIRED: u16 = 0x0100;
const OPCODE_MASK: u16 = 0x7800;
const RCODE_NOT_IMPLEMENTED: u16 = 4;

/// Builds the reply for `query` into `out`, returning its length.
///
/// A/ANY questions get one answer pointing at `address`, other types an
/// empty answer. Other opcodes or question counts get NOTIMP. Responses and
/// unparseable packets yield `None`.
pub fn answer(query: &[u8], address: [u8; 4], out: &mut [u8]) -> Option<usize> {
    if query.len() < HEADER_LEN {
        return None;
    }

    let flags = u16::from_be_bytes([query[2], query[3]]);
    let questions = u16::from_be_bytes([query[4], query[5]]);
    if flags & FLAG_RESPONSE != 0 {
        return None;
    }

    if flags & OPCODE_MASK != 0 || questions != 1 {
        debug!("dns: unsupported query flags={:#06x} qd={}", flags, questions);
        let reply = out.get_mut(..HEADER_LEN)?;
        reply.copy_from_slice(&query[..HEADER_LEN]);
        let reply_flags = FLAG_RESPONSE
            | (flags & (OPCODE_MASK | FLAG_RECURSION_DESIRED))
            | RCODE_NOT_IMPLEMENTED;
        reply[2..4].copy_from_slice(&reply_flags.to_be_bytes());
        reply[4..12].fill(0);
        return Some(HEADER_LEN);
    }

    let question_end = question_end(query)?;
    let qtype = u16::from_be_bytes([query[question_end - 4], query[question_end - 3]]);
    let qclass = u16::from_be_bytes([query[question_end - 2], query[question_end - 1]]);
    let answered = (qtype == TYPE_A || qtype == TYPE_ANY) && qclass & 0x7FFF == CLASS_IN;

    let answer_len = if answered { 16 } else { 0 };
    let total = question_end + answer_len;
    let reply = out.get_mut(..total)?;

    reply[..question_end].copy_from_slice(&query[..question_end]);
    let reply_flags = FLAG_RESPONSE | FLAG_AUTHORITATIVE | (flags & FLAG_RECURSION_DESIRED);
    reply[2..4].copy_from_slice(&reply_flags.to_be_bytes());
    reply[6..8].copy_from_slice(&(answered as u16).to_be_bytes());
    reply[8..12].fill(0);

    if answered {
        let record = &mut reply[question_end..];
        // Name as a pointer to the question at offset 12.
        record[0..2].copy_from_slice(&[0xC0, 0x0C]);
        record[2..4].copy_from_slice(&TYPE_A.to_be_bytes());
        record[4..6].copy_from_slice(&CLASS_IN.to_be_bytes());
        record[6..10].copy_from_slice(&ANSWER_TTL_SECS.to_be_bytes());
        record[10..12].copy_from_slice(&4u16.to_be_bytes());
        record[12..16].copy_from_slice(&address);
    }

    Some(total)
}

/// End offset of the first question (name + type + class).
fn question_end(query: &[u8]) -> Option<usize> {
    let mut pos = HEADER_LEN;
    loop {
        let len = *query.get(pos)? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        // Compression pointers never appear in a question we can answer.
        if len & 0xC0 != 0 {
            return None;
        }
        pos += 1 + len;
    }
    let end = pos + 4;
    (end <= query.len()).then_some(end)
}
