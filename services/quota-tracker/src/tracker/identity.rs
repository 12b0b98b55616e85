use super::TrackerError;

/// Lower-cases and trims an identity. Applying it twice changes nothing.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalizes `raw` and rejects values that cannot key a record, which is
/// only the empty string.
///
/// No email-format or length check happens here; callers validate addresses
/// themselves.
pub fn validate_identity(raw: &str) -> Result<String, TrackerError> {
    let identity = normalize_identity(raw);

    if identity.is_empty() {
        return Err(TrackerError::InvalidIdentity(raw.to_string()));
    }

    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_lowercases() {
        assert_eq!(normalize_identity("  Foo@Bar.COM\n"), "foo@bar.com");
        assert_eq!(normalize_identity("plain"), "plain");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["Foo@Bar.com ", "\tÉLODIE@exemple.fr", "a@b", "  ", "MiXeD Case@x.io"] {
            let once = normalize_identity(raw);
            assert_eq!(normalize_identity(&once), once, "input {raw:?}");
        }
    }

    #[test]
    fn test_validate_rejects_blank() {
        assert!(matches!(
            validate_identity("   "),
            Err(TrackerError::InvalidIdentity(_))
        ));
        assert!(matches!(
            validate_identity(""),
            Err(TrackerError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_validate_accepts_long_identity() {
        let long = format!("{}@x.com", "A".repeat(300));
        assert_eq!(validate_identity(&long).unwrap(), long.to_lowercase());
    }

    #[test]
    fn test_validate_does_not_require_email_shape() {
        assert_eq!(validate_identity(" NoAtSign ").unwrap(), "noatsign");
    }
}
