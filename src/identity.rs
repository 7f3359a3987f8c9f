use axum::http::HeaderMap;
use sqlx::PgPool;

use crate::models::Principal;

/// Pull a header's value as a trimmed `&str`, or `None` if absent/invalid
/// UTF-8/empty.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Resolve a presented credential to a principal. The caller decides
/// whether the result is being used as a buyer or a seller — Identity
/// itself is role-agnostic, per spec.md's Component C.
pub async fn resolve_principal(
    pool: &PgPool,
    api_key: &str,
) -> Result<Option<Principal>, sqlx::Error> {
    Principal::find_by_api_key(pool, api_key).await
}

/// Constant-time comparison for the single operator admin secret. Unlike
/// per-user credentials, the admin key is never hashed before comparing —
/// there's exactly one of it, so there's no lookup table to protect.
pub fn admin_key_matches(presented: &str, configured: &str) -> bool {
    presented.len() == configured.len()
        && ring::constant_time::verify_slices_are_equal(presented.as_bytes(), configured.as_bytes())
            .is_ok()
}
