// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of OpenEthereum.

// OpenEthereum is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// OpenEthereum is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with OpenEthereum.  If not, see <http://www.gnu.org/licenses/>.

//! Nibble handling and the hex-prefix ("compact") path encoding.

use rlp::DecoderError;

/// Expand a byte key into one nibble per element.
pub fn bytes_to_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    for byte in bytes {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    nibbles
}

/// Pack an even-length nibble sequence back into bytes.
pub fn nibbles_to_bytes(nibbles: &[u8]) -> Vec<u8> {
    debug_assert!(nibbles.len() % 2 == 0);
    nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect()
}

/// Length of the shared prefix of two nibble sequences.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Hex-prefix encode a nibble path. The first nibble of the output carries
/// the leaf flag (0x2) and the odd-length flag (0x1).
pub fn hex_prefix_encode(nibbles: &[u8], leaf: bool) -> Vec<u8> {
    let odd = nibbles.len() % 2 == 1;
    let mut flag = if leaf { 0x20 } else { 0x00 };
    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);

    let rest = if odd {
        flag |= 0x10 | nibbles[0];
        &nibbles[1..]
    } else {
        nibbles
    };
    out.push(flag);
    for pair in rest.chunks(2) {
        out.push((pair[0] << 4) | pair[1]);
    }
    out
}

/// Decode a hex-prefix path into `(nibbles, is_leaf)`.
pub fn hex_prefix_decode(encoded: &[u8]) -> Result<(Vec<u8>, bool), DecoderError> {
    let first = *encoded.first().ok_or(DecoderError::RlpIsTooShort)?;
    if first & 0xc0 != 0 {
        return Err(DecoderError::Custom("invalid hex-prefix flag"));
    }
    let leaf = first & 0x20 != 0;
    let mut nibbles = Vec::with_capacity(encoded.len() * 2);
    if first & 0x10 != 0 {
        nibbles.push(first & 0x0f);
    }
    for byte in &encoded[1..] {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    Ok((nibbles, leaf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_round_trips() {
        let key = [0x12, 0x34, 0xf0];
        let nibbles = bytes_to_nibbles(&key);
        assert_eq!(nibbles, vec![0x1, 0x2, 0x3, 0x4, 0xf, 0x0]);
        assert_eq!(nibbles_to_bytes(&nibbles), key.to_vec());
    }

    #[test]
    fn hex_prefix_known_encodings() {
        // Even extension path.
        assert_eq!(
            hex_prefix_encode(&[0x1, 0x2, 0x3, 0x4], false),
            vec![0x00, 0x12, 0x34]
        );
        // Odd extension path.
        assert_eq!(hex_prefix_encode(&[0x1, 0x2, 0x3], false), vec![0x11, 0x23]);
        // Even leaf path.
        assert_eq!(hex_prefix_encode(&[0x0, 0xf], true), vec![0x20, 0x0f]);
        // Odd leaf path.
        assert_eq!(hex_prefix_encode(&[0xf], true), vec![0x3f]);
        // Empty leaf path.
        assert_eq!(hex_prefix_encode(&[], true), vec![0x20]);
    }

    #[test]
    fn hex_prefix_round_trips() {
        for leaf in &[false, true] {
            for path in &[vec![], vec![0x7], vec![0x1, 0x2], vec![0x1, 0x2, 0x3]] {
                let encoded = hex_prefix_encode(path, *leaf);
                assert_eq!(hex_prefix_decode(&encoded).unwrap(), (path.clone(), *leaf));
            }
        }
    }

    #[test]
    fn common_prefix() {
        assert_eq!(common_prefix_len(&[1, 2, 3], &[1, 2, 4]), 2);
        assert_eq!(common_prefix_len(&[1, 2], &[1, 2, 4]), 2);
        assert_eq!(common_prefix_len(&[5], &[1]), 0);
    }
}
