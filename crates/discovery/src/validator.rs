//! Shape check for discovery responses

use crate::error::ValidationError;
use crate::model::DiscoveryResponse;

/// Smallest target group count accepted as a healthy enumeration.
pub const MIN_TARGET_GROUPS: usize = 2;

/// Parse `body` as a list of target groups and reject degenerate results.
///
/// A `null` body counts as an empty list. Target strings and label names are
/// not inspected.
pub fn validate(body: &[u8]) -> Result<DiscoveryResponse, ValidationError> {
    let response: DiscoveryResponse =
        serde_json::from_slice::<Option<DiscoveryResponse>>(body)?.unwrap_or_default();

    if response.len() < MIN_TARGET_GROUPS {
        return Err(ValidationError::Degenerate {
            count: response.len(),
        });
    }

    Ok(response)
}
