/// Upper bound on reservations held by one resource.
pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 100_000;

/// Byte length cap on an identity key.
pub const MAX_IDENTITY_LEN: usize = 256;
