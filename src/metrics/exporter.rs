use crate::Result;
use prometheus::{Encoder, Registry, TextEncoder};

/// Render a registry in the Prometheus text exposition format
pub fn encode_text(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
