// JWT validation untuk Payment Service

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use thiserror::Error;

// Claims structure untuk JWT token
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TokenClaims {
    pub sub: i32,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub token_type: String,
    pub jti: String,
}

// Error types untuk JWT validation
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Token invalid atau expired")]
    InvalidToken,
    #[error("Token type tidak valid untuk endpoint ini")]
    InvalidTokenType,
}

// Decode JWT token dan validasi signature; business services hanya
// menerima access token, refresh token ditolak
pub fn validate_token(token: &str, secret: &str) -> Result<TokenClaims, JwtError> {
    let validation = Validation::new(Algorithm::HS256);
    let token_data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| JwtError::InvalidToken)?;

    if token_data.claims.token_type != "access" {
        return Err(JwtError::InvalidTokenType);
    }

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const TEST_SECRET: &str = "test-secret-key-for-testing-only";

    fn create_test_token(user_id: i32, email: &str, role: &str, token_type: &str) -> String {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: user_id,
            email: email.to_string(),
            role: role.to_string(),
            exp: (now + Duration::minutes(15)).timestamp(),
            iat: now.timestamp(),
            token_type: token_type.to_string(),
            jti: "test-jti-123".to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_ref()),
        )
        .unwrap()
    }

    #[test]
    fn test_validate_access_token_success() {
        let token = create_test_token(123, "test@example.com", "customer", "access");
        let claims = validate_token(&token, TEST_SECRET).unwrap();

        assert_eq!(claims.sub, 123);
        assert_eq!(claims.role, "customer");
        assert_eq!(claims.token_type, "access");
    }

    #[test]
    fn test_validate_rejects_refresh_token() {
        let token = create_test_token(123, "test@example.com", "customer", "refresh");
        let result = validate_token(&token, TEST_SECRET);

        assert!(matches!(result.unwrap_err(), JwtError::InvalidTokenType));
    }

    #[test]
    fn test_validate_rejects_wrong_secret() {
        let token = create_test_token(123, "test@example.com", "customer", "access");
        let result = validate_token(&token, "some-other-secret");

        assert!(matches!(result.unwrap_err(), JwtError::InvalidToken));
    }

    #[test]
    fn test_validate_rejects_garbage_token() {
        let result = validate_token("invalid.token.here", TEST_SECRET);
        assert!(matches!(result.unwrap_err(), JwtError::InvalidToken));
    }

    #[test]
    fn test_validate_rejects_expired_token() {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: 123,
            email: "test@example.com".to_string(),
            role: "customer".to_string(),
            exp: (now - Duration::minutes(5)).timestamp(),
            iat: (now - Duration::minutes(20)).timestamp(),
            token_type: "access".to_string(),
            jti: "test-jti-123".to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_ref()),
        )
        .unwrap();

        let result = validate_token(&token, TEST_SECRET);
        assert!(matches!(result.unwrap_err(), JwtError::InvalidToken));
    }
}
