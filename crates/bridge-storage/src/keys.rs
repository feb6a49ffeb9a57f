//! Storage key constants.

/// Keys used in the durable store.
pub struct StorageKeys;

impl StorageKeys {
    /// The single live connect-flow record.
    pub const CONNECT_STATE: &'static str = "connectState";

    /// Credential issued by a successful handshake.
    pub const CREDENTIAL_RECORD: &'static str = "credentialRecord";
}
