//! API key service - secret generation, validation, masking, and storage.
//!
//! Secrets have the shape `<env>_<64 hex chars>`: an environment tag
//! (`live` or `test`) followed by 32 bytes of CSPRNG output, hex-encoded.
//! The plaintext secret is the lookup key for authentication, so it is
//! stored as-is under a unique index; everything that leaves the server
//! after creation goes through `mask_secret`.

use crate::{
    db::DbPool,
    error::AppError,
    models::api_key::{ApiKey, CreateApiKeyRequest, EnvTag, dedup_capabilities},
};
use uuid::Uuid;

/// Random bytes drawn per secret (64 hex characters).
pub const SECRET_BYTE_LENGTH: usize = 32;

/// Hex length a well-formed secret must carry.
pub const SECRET_HEX_LENGTH: usize = 64;

/// Shown instead of a mask when the input is too short to mask safely.
pub const MASK_PLACEHOLDER: &str = "********";

/// Generate a new secret: `<env>_` + `byte_length` random bytes as hex.
///
/// Randomness comes from the OS-seeded CSPRNG; secrets must be
/// unguessable.
pub fn generate_secret(env: EnvTag, byte_length: usize) -> String {
    let mut bytes = vec![0u8; byte_length];
    rand::fill(&mut bytes[..]);
    format!("{}_{}", env.as_str(), hex::encode(bytes))
}

/// Check secret shape without touching the database.
///
/// True iff the string is `<env>_<64 lowercase hex chars>` with a known
/// environment tag. Runs before every lookup so malformed input is
/// rejected without a query.
pub fn is_valid_secret_format(secret: &str) -> bool {
    let Some((tag, hex_part)) = secret.split_once('_') else {
        return false;
    };
    if tag.parse::<EnvTag>().is_err() {
        return false;
    }
    hex_part.len() == SECRET_HEX_LENGTH
        && hex_part
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Recover the environment tag from a well-formed secret.
///
/// Returns None for anything `is_valid_secret_format` rejects.
pub fn extract_env_tag(secret: &str) -> Option<EnvTag> {
    if !is_valid_secret_format(secret) {
        return None;
    }
    secret.split_once('_')?.0.parse().ok()
}

/// Mask a secret for display: first 8 characters + "..." + last 4.
///
/// Inputs shorter than 12 characters collapse to a fixed placeholder.
/// This is a one-way display transform; masked values are never used for
/// lookup.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 12 {
        return MASK_PLACEHOLDER.to_string();
    }
    let prefix: String = chars[..8].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

/// Create and persist a new API key for a project.
///
/// # Process
///
/// 1. Collapse duplicate capabilities
/// 2. Generate a secret (environment tag from the request)
/// 3. Insert with `is_active = true`, `last_used_at = NULL`
/// 4. On a unique-index collision, regenerate once; a second collision
///    surfaces as `DuplicateSecret`
///
/// Returns the stored record with the full secret still inside; the
/// creation handler is the only caller allowed to serialize it unmasked.
pub async fn create_key(
    pool: &DbPool,
    project_id: Uuid,
    request: &CreateApiKeyRequest,
) -> Result<ApiKey, AppError> {
    let capabilities = dedup_capabilities(&request.capabilities);

    for attempt in 0..2 {
        let secret = generate_secret(request.environment, SECRET_BYTE_LENGTH);

        let result = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (project_id, secret, display_name, description, capabilities)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, project_id, secret, display_name, description, capabilities,
                      is_active, last_used_at, created_at, updated_at
            "#,
        )
        .bind(project_id)
        .bind(&secret)
        .bind(&request.display_name)
        .bind(&request.description)
        .bind(&capabilities)
        .fetch_one(pool)
        .await;

        match result {
            Ok(key) => return Ok(key),
            Err(err) if is_unique_violation(&err) => {
                if attempt == 0 {
                    tracing::warn!("generated API key secret collided, retrying once");
                }
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(AppError::DuplicateSecret)
}

/// Exact-match secret lookup. Runs on every authenticated request and is
/// backed by the unique index on `api_keys.secret`.
pub async fn find_by_secret(pool: &DbPool, secret: &str) -> Result<Option<ApiKey>, AppError> {
    let key = sqlx::query_as::<_, ApiKey>(
        r#"
        SELECT id, project_id, secret, display_name, description, capabilities,
               is_active, last_used_at, created_at, updated_at
        FROM api_keys
        WHERE secret = $1
        "#,
    )
    .bind(secret)
    .fetch_optional(pool)
    .await?;

    Ok(key)
}

/// Stamp `last_used_at` on a key.
///
/// Callers spawn this off the request path; a failure here must never
/// fail the request it authenticated.
pub async fn touch_last_used(pool: &DbPool, key_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
        .bind(key_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_are_well_formed() {
        for env in [EnvTag::Live, EnvTag::Test] {
            let secret = generate_secret(env, SECRET_BYTE_LENGTH);
            assert!(is_valid_secret_format(&secret));
            assert_eq!(extract_env_tag(&secret), Some(env));
        }
    }

    #[test]
    fn generated_secrets_are_unique() {
        let a = generate_secret(EnvTag::Live, SECRET_BYTE_LENGTH);
        let b = generate_secret(EnvTag::Live, SECRET_BYTE_LENGTH);
        assert_ne!(a, b);
    }

    #[test]
    fn format_rejects_bad_shapes() {
        let hex64 = "a".repeat(64);
        assert!(is_valid_secret_format(&format!("live_{hex64}")));
        assert!(is_valid_secret_format(&format!("test_{hex64}")));

        // wrong tag, wrong length, uppercase hex, no separator
        assert!(!is_valid_secret_format(&format!("prod_{hex64}")));
        assert!(!is_valid_secret_format("live_abc123"));
        assert!(!is_valid_secret_format(&format!("live_{}", "A".repeat(64))));
        assert!(!is_valid_secret_format(&hex64));
        assert!(!is_valid_secret_format(""));
    }

    #[test]
    fn extract_env_tag_requires_valid_format() {
        assert_eq!(extract_env_tag("live_short"), None);
        assert_eq!(
            extract_env_tag(&format!("test_{}", "0".repeat(64))),
            Some(EnvTag::Test)
        );
    }

    #[test]
    fn mask_short_input_is_placeholder() {
        assert_eq!(mask_secret(""), MASK_PLACEHOLDER);
        assert_eq!(mask_secret("live_abc"), MASK_PLACEHOLDER);
        assert_eq!(mask_secret("12345678901"), MASK_PLACEHOLDER);
    }

    #[test]
    fn mask_keeps_prefix_and_suffix_only() {
        let secret = generate_secret(EnvTag::Live, SECRET_BYTE_LENGTH);
        let masked = mask_secret(&secret);

        assert_ne!(masked, secret);
        assert!(masked.starts_with(&secret[..8]));
        assert!(masked.ends_with(&secret[secret.len() - 4..]));
        // 8 + "..." + 4
        assert_eq!(masked.chars().count(), 15);
    }
}
