use serde::{Deserialize, Serialize};

/// bincode encoding for everything that crosses a boundary: call payloads,
/// transactions, receipts and persisted chains. The compressed variants are
/// used for storage.
pub trait TollSerialize: Serialize + for<'a> Deserialize<'a> + Sized {
    fn serialize_toll(&self) -> Result<Vec<u8>, std::io::Error> {
        let encoded = bincode::serialize(&self).map_err(std::io::Error::other)?;
        Ok(encoded)
    }

    fn deserialize_toll(data: &[u8]) -> Result<Self, std::io::Error> {
        let decoded = bincode::deserialize::<Self>(data).map_err(std::io::Error::other)?;
        Ok(decoded)
    }

    fn serialize_compressed(&self) -> Result<Vec<u8>, std::io::Error> {
        let encoded = self.serialize_toll()?;
        Ok(lz4_flex::compress_prepend_size(&encoded))
    }

    fn deserialize_compressed(data: &[u8]) -> Result<Self, std::io::Error> {
        let decompressed = lz4_flex::decompress_size_prepended(data).map_err(std::io::Error::other)?;
        Self::deserialize_toll(&decompressed)
    }
}
