use std::io::{self, Read};

/// Reader adapter that counts and BLAKE3-hashes everything read through it.
///
/// The backend wraps incoming payloads in it so size and hash come out of
/// the same pass that writes the data store.
pub struct HashingReader<R> {
    inner: R,
    hasher: blake3::Hasher,
    size: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
            size: 0,
        }
    }

    /// Bytes read so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Hex digest of the bytes read so far.
    pub fn hex_digest(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }

    /// Read and discard the rest of the input, still counting and hashing it.
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }
}

/// Hex BLAKE3 digest of `data`.
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_hashes() {
        let mut reader = HashingReader::new(&b"hello world"[..]);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(reader.size(), 11);
        assert_eq!(reader.hex_digest(), content_hash(b"hello world"));
    }

    #[test]
    fn drain_includes_remaining_bytes() {
        let mut reader = HashingReader::new(&b"abcdef"[..]);
        let mut head = [0u8; 2];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(reader.drain().unwrap(), 4);
        assert_eq!(reader.size(), 6);
        assert_eq!(reader.hex_digest(), content_hash(b"abcdef"));
    }

    #[test]
    fn digest_is_64_hex_chars() {
        let digest = content_hash(b"");
        assert_eq!(digest.len(), 64);
        assert!(digest.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
