//! Simple byte-oriented run-length encoding, used as the default (and, per
//! §4.2, swappable) [Compressor].
//!
//! Format: a sequence of `(count: u8, byte: u8)` pairs, where `count` is the
//! number of repetitions minus one (so a single byte is `(0, byte)` and a run
//! can be at most 256 bytes long before it has to split into another pair).

use anyhow::{ensure, Result};

use super::Compressor;

pub struct RunLengthEncoding;

impl Compressor for RunLengthEncoding {
    fn compress(data: &[u8]) -> Result<Vec<u8>> {
        let mut result = Vec::with_capacity(data.len());
        let mut iter = data.iter().peekable();
        while let Some(&byte) = iter.next() {
            let mut count: u16 = 1;
            while count < 256 && iter.peek() == Some(&&byte) {
                iter.next();
                count += 1;
            }
            result.push((count - 1) as u8);
            result.push(byte);
        }
        Ok(result)
    }

    fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        ensure!(data.len() % 2 == 0, "run-length encoded data has odd length");
        let mut result = Vec::with_capacity(data.len());
        for pair in data.chunks_exact(2) {
            let count = pair[0] as usize + 1;
            let byte = pair[1];
            result.resize(result.len() + count, byte);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roundtrips() {
        let compressed = RunLengthEncoding::compress(&[]).unwrap();
        assert_eq!(Vec::<u8>::new(), RunLengthEncoding::decompress(&compressed).unwrap());
    }

    #[test]
    fn single_run_roundtrips() {
        let data = vec![5u8; 300];
        let compressed = RunLengthEncoding::compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(data, RunLengthEncoding::decompress(&compressed).unwrap());
    }

    #[test]
    fn mixed_data_roundtrips() {
        let data = vec![1, 1, 1, 2, 3, 3, 3, 3, 3, 4];
        let compressed = RunLengthEncoding::compress(&data).unwrap();
        assert_eq!(data, RunLengthEncoding::decompress(&compressed).unwrap());
    }

    #[test]
    fn rejects_malformed_odd_length_input() {
        assert!(RunLengthEncoding::decompress(&[1, 2, 3]).is_err());
    }
}
