//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了JSON序列化器的实现。

use super::Serializer;
use crate::error::{CacheError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// JSON序列化器
///
/// 未压缩的输出是合法 JSON，gzip 压缩后的输出以 `1f 8b` 开头，
/// 两者的首字节都不是 NUL，因此不会与空值标记相同
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer {
    /// 是否启用gzip压缩
    compress: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self { compress: false }
    }

    /// 创建启用压缩的JSON序列化器
    pub fn with_compression() -> Self {
        Self { compress: true }
    }

    #[cfg(feature = "flate2")]
    fn gzip(data: &[u8]) -> Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder
            .write_all(data)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    #[cfg(feature = "flate2")]
    fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let mut decoded = Vec::new();
        GzDecoder::new(data)
            .read_to_end(&mut decoded)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        Ok(decoded)
    }

    #[cfg(not(feature = "flate2"))]
    fn gzip(data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    #[cfg(not(feature = "flate2"))]
    fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let json_bytes =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        if self.compress {
            Self::gzip(&json_bytes)
        } else {
            Ok(json_bytes)
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        if self.compress {
            let decoded = Self::gunzip(data)?;
            serde_json::from_slice(&decoded).map_err(|e| CacheError::Serialization(e.to_string()))
        } else {
            serde_json::from_slice(data).map_err(|e| CacheError::Serialization(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn test_compressed_payload_decodes() {
        let serializer = JsonSerializer::with_compression();
        let user = User {
            id: 7,
            name: "alice".repeat(50),
        };
        let bytes = serializer.serialize(&user).unwrap();
        assert!(bytes.len() < serde_json::to_vec(&user).unwrap().len());
        let decoded: User = serializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, user);
    }

    #[test]
    fn test_output_never_equals_null_marker() {
        use crate::client::{is_null_marker, NULL_MARKER};

        for serializer in [JsonSerializer::new(), JsonSerializer::with_compression()] {
            let marker_text = String::from_utf8_lossy(NULL_MARKER).into_owned();
            for bytes in [
                serializer.serialize(&marker_text).unwrap(),
                serializer.serialize(&Option::<u32>::None).unwrap(),
                serializer.serialize("").unwrap(),
            ] {
                assert!(!is_null_marker(&bytes));
                assert_ne!(bytes.first(), Some(&0u8));
            }
        }
    }

    #[test]
    fn test_decode_failure_is_serialization_error() {
        let serializer = JsonSerializer::new();
        let result: Result<User> = serializer.deserialize(b"not json");
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }
}
