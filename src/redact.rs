//! Secret redaction for sensitive data in logs, serialization, and display.
//!
//! [`SigningCredential`] holds the process-wide private key. It is read-only
//! after startup and never appears through `Debug`, `Display` or `Serialize`.

use serde::Serialize;
use std::fmt::{self, Debug, Display};

/// Wrapper that redacts its inner value when formatted or serialized.
#[derive(Clone, Copy)]
pub struct Redacted<T>(pub T);

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Serialize for Redacted<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        "<redacted>".serialize(serializer)
    }
}

/// EVM private key used to sign transfers, burns and mints
#[derive(Clone, Debug, Serialize)]
pub struct SigningCredential(Redacted<String>);

impl SigningCredential {
    pub fn new(private_key: impl Into<String>) -> Self {
        Self(Redacted(private_key.into()))
    }

    /// The raw key, for handing to a signer. Never log the result.
    pub(crate) fn expose(&self) -> &str {
        &self.0 .0
    }

    /// Shape check only: `0x` followed by 64 hex characters
    pub fn is_well_formed(&self) -> bool {
        let key = self.expose();
        key.len() == 66
            && key.starts_with("0x")
            && key[2..].chars().all(|c| c.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_credential_never_formats_secret() {
        let cred = SigningCredential::new(KEY);
        assert!(!format!("{:?}", cred).contains("ac0974"));
        assert!(!serde_json::to_string(&cred).unwrap().contains("ac0974"));
        assert_eq!(format!("{}", Redacted(KEY)), "<redacted>");
    }

    #[test]
    fn test_credential_shape() {
        assert!(SigningCredential::new(KEY).is_well_formed());
        assert!(!SigningCredential::new("0x1234").is_well_formed());
        assert!(!SigningCredential::new(&KEY[2..]).is_well_formed());
    }
}
