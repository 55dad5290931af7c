/// Key layout for the record partitions
///
/// Partition structure:
/// - `pdrs`: pdr:{pdr_name} -> PdrRecord (JSON)
/// - `granules`: granule:{collection_name}|{granule_id} -> GranuleRecord (JSON)
/// - `providers`: provider:{provider_name} -> ProviderStatus (JSON)
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PDR_PARTITION: &str = "pdrs";
pub const GRANULE_PARTITION: &str = "granules";
pub const PROVIDER_PARTITION: &str = "providers";

/// Composite key of a granule record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranuleKey {
    pub collection_name: String,
    pub granule_id: String,
}

impl GranuleKey {
    pub fn new(collection_name: impl Into<String>, granule_id: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            granule_id: granule_id.into(),
        }
    }
}

impl fmt::Display for GranuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection_name, self.granule_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Pdr(String),
    Granule(GranuleKey),
    Provider(String),
}

impl RecordKey {
    pub fn pdr(name: impl Into<String>) -> Self {
        RecordKey::Pdr(name.into())
    }

    pub fn granule(collection_name: impl Into<String>, granule_id: impl Into<String>) -> Self {
        RecordKey::Granule(GranuleKey::new(collection_name, granule_id))
    }

    pub fn provider(name: impl Into<String>) -> Self {
        RecordKey::Provider(name.into())
    }

    /// Partition the record lives in
    pub fn partition(&self) -> &'static str {
        match self {
            RecordKey::Pdr(_) => PDR_PARTITION,
            RecordKey::Granule(_) => GRANULE_PARTITION,
            RecordKey::Provider(_) => PROVIDER_PARTITION,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            RecordKey::Pdr(name) => format!("pdr:{}", name),
            RecordKey::Granule(key) => {
                format!("granule:{}|{}", key.collection_name, key.granule_id)
            }
            RecordKey::Provider(name) => format!("provider:{}", name),
        }
        .into_bytes()
    }

    pub fn decode(key: &[u8]) -> Option<Self> {
        let key_str = std::str::from_utf8(key).ok()?;
        if let Some(name) = key_str.strip_prefix("pdr:") {
            return Some(RecordKey::pdr(name));
        }
        if let Some(rest) = key_str.strip_prefix("granule:") {
            let (collection, granule) = rest.split_once('|')?;
            return Some(RecordKey::granule(collection, granule));
        }
        key_str.strip_prefix("provider:").map(RecordKey::provider)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Pdr(name) => write!(f, "pdr {}", name),
            RecordKey::Granule(key) => write!(f, "granule {}", key),
            RecordKey::Provider(name) => write!(f, "provider {}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdr_key_encoding() {
        let key = RecordKey::pdr("PDN.ID1703151100.PDR");
        assert_eq!(key.encode(), b"pdr:PDN.ID1703151100.PDR");
        assert_eq!(key.partition(), PDR_PARTITION);
        assert_eq!(RecordKey::decode(&key.encode()), Some(key));
    }

    #[test]
    fn test_granule_key_encoding() {
        let key = RecordKey::granule("MOD09GQ", "MOD09GQ.A2017025.h21v00.006.2017034065104");
        assert_eq!(
            key.encode(),
            b"granule:MOD09GQ|MOD09GQ.A2017025.h21v00.006.2017034065104"
        );
        assert_eq!(RecordKey::decode(&key.encode()), Some(key));
    }

    #[test]
    fn test_provider_key_and_garbage() {
        let key = RecordKey::provider("LPDAAC");
        assert_eq!(RecordKey::decode(&key.encode()), Some(key));
        assert_eq!(RecordKey::decode(b"granule:no-separator"), None);
        assert_eq!(RecordKey::decode(b"job:123"), None);
    }
}
