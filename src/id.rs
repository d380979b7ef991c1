use uuid::Uuid;

/// UUIDv7 so freshly minted ids sort by creation time.
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}
