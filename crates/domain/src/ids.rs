use uuid::Uuid;

/// Mint a new 128-bit identifier for a session, message, or conversation.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Validate that a caller-supplied id is a well-formed UUID (client-minted
/// session ids are accepted per §3, but must still parse).
pub fn validate_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}
