//! Message validation rules.

use crate::error::HubError;

/// Longest accepted group name, in bytes.
const MAX_GROUP_NAME_LEN: usize = 256;

/// Validates the raw size and emptiness of an inbound frame.
pub fn validate_inbound(raw: &[u8], max_message_size: usize) -> Result<(), HubError> {
    if raw.len() > max_message_size {
        return Err(HubError::InvalidMessageData(format!(
            "message exceeds maximum size of {max_message_size} bytes"
        )));
    }

    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(HubError::InvalidMessageData("empty message".to_string()));
    }

    Ok(())
}

/// Validates a group name from a join/leave request.
pub fn validate_group_name(group: &str) -> Result<(), HubError> {
    if group.trim().is_empty() {
        return Err(HubError::InvalidMessageData(
            "group name must not be empty".to_string(),
        ));
    }

    if group.len() > MAX_GROUP_NAME_LEN {
        return Err(HubError::InvalidMessageData(format!(
            "group name exceeds {MAX_GROUP_NAME_LEN} bytes"
        )));
    }

    Ok(())
}
