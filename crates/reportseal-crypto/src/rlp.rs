// Recursive Length Prefix encoding, as used for EVM transactions

use anyhow::{anyhow, Result};

/// A decoded RLP item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
    Bytes(Vec<u8>),
    List(Vec<RlpItem>),
}

impl RlpItem {
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            RlpItem::Bytes(b) => Ok(b),
            RlpItem::List(_) => Err(anyhow!("Expected RLP bytes, found list")),
        }
    }

    pub fn as_list(&self) -> Result<&[RlpItem]> {
        match self {
            RlpItem::List(items) => Ok(items),
            RlpItem::Bytes(_) => Err(anyhow!("Expected RLP list, found bytes")),
        }
    }

    /// Interprets the item as a big-endian unsigned integer.
    pub fn as_u128(&self) -> Result<u128> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 16 {
            return Err(anyhow!("RLP integer too large: {} bytes", bytes.len()));
        }
        Ok(bytes.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
    }
}

/// Big-endian length bytes without leading zeros.
fn length_bytes(mut n: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while n > 0 {
        out.push((n & 0xff) as u8);
        n >>= 8;
    }
    out.reverse();
    out
}

fn encode_header(len: usize, short_base: u8, long_base: u8) -> Vec<u8> {
    if len <= 55 {
        vec![short_base + len as u8]
    } else {
        let len_bytes = length_bytes(len);
        let mut out = vec![long_base + len_bytes.len() as u8];
        out.extend_from_slice(&len_bytes);
        out
    }
}

/// Encodes a byte string.
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return bytes.to_vec();
    }
    let mut out = encode_header(bytes.len(), 0x80, 0xb7);
    out.extend_from_slice(bytes);
    out
}

/// Encodes an unsigned integer (minimal big-endian, zero is the empty string).
pub fn encode_uint(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    encode_bytes(strip_leading_zeros(&bytes))
}

/// Encodes a big-endian integer given as raw bytes (e.g. a 32-byte signature scalar).
pub fn encode_uint_bytes(bytes: &[u8]) -> Vec<u8> {
    encode_bytes(strip_leading_zeros(bytes))
}

/// Wraps already-encoded items in a list.
pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(Vec::len).sum();
    let mut out = encode_header(payload_len, 0xc0, 0xf7);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

/// Decodes a single RLP item that must span the whole input.
pub fn decode(input: &[u8]) -> Result<RlpItem> {
    let (item, consumed) = decode_item(input)?;
    if consumed != input.len() {
        return Err(anyhow!(
            "Trailing bytes after RLP item: {} of {} consumed",
            consumed,
            input.len()
        ));
    }
    Ok(item)
}

fn read_length(input: &[u8], len_of_len: usize) -> Result<usize> {
    if input.len() < 1 + len_of_len {
        return Err(anyhow!("Truncated RLP length"));
    }
    if len_of_len > std::mem::size_of::<usize>() {
        return Err(anyhow!("RLP length prefix too large"));
    }
    Ok(input[1..1 + len_of_len]
        .iter()
        .fold(0usize, |acc, b| (acc << 8) | usize::from(*b)))
}

fn take(input: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    let end = start
        .checked_add(len)
        .ok_or_else(|| anyhow!("RLP length overflow"))?;
    input
        .get(start..end)
        .ok_or_else(|| anyhow!("Truncated RLP payload"))
}

fn decode_item(input: &[u8]) -> Result<(RlpItem, usize)> {
    let prefix = *input.first().ok_or_else(|| anyhow!("Empty RLP input"))?;
    match prefix {
        0x00..=0x7f => Ok((RlpItem::Bytes(vec![prefix]), 1)),
        0x80..=0xb7 => {
            let len = usize::from(prefix - 0x80);
            let payload = take(input, 1, len)?;
            Ok((RlpItem::Bytes(payload.to_vec()), 1 + len))
        }
        0xb8..=0xbf => {
            let len_of_len = usize::from(prefix - 0xb7);
            let len = read_length(input, len_of_len)?;
            let payload = take(input, 1 + len_of_len, len)?;
            Ok((RlpItem::Bytes(payload.to_vec()), 1 + len_of_len + len))
        }
        0xc0..=0xf7 => {
            let len = usize::from(prefix - 0xc0);
            let payload = take(input, 1, len)?;
            Ok((RlpItem::List(decode_list_payload(payload)?), 1 + len))
        }
        0xf8..=0xff => {
            let len_of_len = usize::from(prefix - 0xf7);
            let len = read_length(input, len_of_len)?;
            let payload = take(input, 1 + len_of_len, len)?;
            Ok((
                RlpItem::List(decode_list_payload(payload)?),
                1 + len_of_len + len,
            ))
        }
    }
}

fn decode_list_payload(mut payload: &[u8]) -> Result<Vec<RlpItem>> {
    let mut items = Vec::new();
    while !payload.is_empty() {
        let (item, consumed) = decode_item(payload)?;
        items.push(item);
        payload = &payload[consumed..];
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vectors from the Ethereum RLP documentation
    #[test]
    fn test_encode_known_vectors() {
        assert_eq!(encode_bytes(b"dog"), vec![0x83, b'd', b'o', b'g']);
        assert_eq!(encode_uint(0), vec![0x80]);
        assert_eq!(encode_uint(15), vec![0x0f]);
        assert_eq!(encode_uint(1024), vec![0x82, 0x04, 0x00]);
        assert_eq!(
            encode_list(&[encode_bytes(b"cat"), encode_bytes(b"dog")]),
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
        assert_eq!(encode_list(&[]), vec![0xc0]);
    }

    #[test]
    fn test_encode_long_string() {
        let text = b"Lorem ipsum dolor sit amet, consectetur adipisicing elit";
        let encoded = encode_bytes(text);
        assert_eq!(&encoded[..2], &[0xb8, 0x38]);
        assert_eq!(&encoded[2..], text);
    }

    #[test]
    fn test_uint_bytes_strips_leading_zeros() {
        let mut scalar = [0u8; 32];
        scalar[31] = 0x05;
        assert_eq!(encode_uint_bytes(&scalar), vec![0x05]);
    }

    #[test]
    fn test_decode_nested_list() {
        let encoded = encode_list(&[
            encode_uint(1024),
            encode_list(&[encode_bytes(b"cat")]),
            encode_bytes(&[0u8; 60]),
        ]);
        let item = decode(&encoded).unwrap();
        let list = item.as_list().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].as_u128().unwrap(), 1024);
        assert_eq!(list[1].as_list().unwrap()[0].as_bytes().unwrap(), b"cat");
        assert_eq!(list[2].as_bytes().unwrap().len(), 60);
    }

    #[test]
    fn test_decode_rejects_truncated_input() {
        assert!(decode(&[0x83, b'd', b'o']).is_err());
        assert!(decode(&[]).is_err());
        assert!(decode(&[0x83, b'd', b'o', b'g', 0x00]).is_err());
    }
}
