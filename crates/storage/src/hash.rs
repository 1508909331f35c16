//! Content hashing.
//!
//! Object stores report an MD5 digest (Swift's `hash`, S3's single-part
//! `ETag`) for every object, so local content is hashed the same way to be
//! comparable.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Read buffer size used when hashing streams; bounds memory per file.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Hex-encoded MD5 digest of an in-memory buffer.
pub fn md5_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", md5::compute(data))
}

/// Hex-encoded MD5 digest of everything readable from `reader`, consumed in
/// [`HASH_CHUNK_SIZE`] chunks.
pub async fn md5_reader<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<String> {
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}
