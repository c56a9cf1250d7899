//! Gzip codec shared by the agent's report encoder and the server's
//! request/response middleware.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let payload = br#"[{"id":"Alloc","type":"gauge","value":1024.0}]"#;
        let packed = compress(payload).unwrap();
        assert_eq!(decompress(&packed).unwrap(), payload);
    }

    #[test]
    fn garbage_input_fails() {
        assert!(decompress(b"definitely not gzip").is_err());
    }
}
