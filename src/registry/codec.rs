//! Service instance wire format

use super::ServiceInstance;
use crate::CodecError;

pub(crate) fn encode(instance: &ServiceInstance) -> std::result::Result<Vec<u8>, CodecError> {
    serde_json::to_vec(instance).map_err(|source| CodecError::Encode {
        id: instance.id.clone(),
        source,
    })
}

/// Malformed input is reported as [`CodecError::Decode`]; the watch path skips such records.
pub(crate) fn decode(
    key: &str,
    value: &[u8],
) -> std::result::Result<ServiceInstance, CodecError> {
    serde_json::from_slice(value).map_err(|source| CodecError::Decode {
        key: key.to_string(),
        source,
    })
}
