//! Reply encoding and decoding.

use tmon_core::Celsius;

use crate::ProtocolError;

/// Encodes a hostname reply.
pub fn encode_hostname(hostname: &str) -> Vec<u8> {
    hostname.as_bytes().to_vec()
}

/// Encodes a temperature reply as its decimal string (`23`, `-1`).
pub fn encode_temperature(value: Celsius) -> Vec<u8> {
    value.to_string().into_bytes()
}

/// Decodes a hostname reply.
///
/// The reply is taken verbatim; only UTF-8 validity is checked.
pub fn decode_hostname(payload: &[u8]) -> Result<String, ProtocolError> {
    std::str::from_utf8(payload)
        .map(str::to_string)
        .map_err(|_| ProtocolError::NotUtf8)
}

/// Decodes a temperature reply.
///
/// An empty reply means the sensor could not take a reading.
pub fn decode_temperature(payload: &[u8]) -> Result<Celsius, ProtocolError> {
    if payload.is_empty() {
        return Err(ProtocolError::Empty);
    }
    let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::NotUtf8)?;
    text.trim()
        .parse::<Celsius>()
        .map_err(|_| ProtocolError::InvalidTemperature(text.to_string()))
}
