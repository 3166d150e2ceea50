//! Signed session tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::models::Role;

const TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    /// The subject is the account's ObjectId in hex. A token whose subject
    /// does not parse was not minted by us.
    pub fn account_id(&self) -> Result<ObjectId, ServiceError> {
        ObjectId::parse_str(&self.sub).map_err(|_| ServiceError::TokenInvalid)
    }
}

/// Issues and verifies HS256 session tokens. Keys are derived from the
/// configured secret once, at startup.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, account_id: ObjectId, role: Role) -> Result<String, ServiceError> {
        self.issue_with_ttl(account_id, role, TOKEN_TTL_SECS)
    }

    fn issue_with_ttl(
        &self,
        account_id: ObjectId,
        role: Role,
        ttl_secs: i64,
    ) -> Result<String, ServiceError> {
        let claims = Claims {
            sub: account_id.to_hex(),
            role,
            exp: (Utc::now() + Duration::seconds(ttl_secs)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ServiceError::Internal(format!("token signing failed: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
                _ => ServiceError::TokenInvalid,
            })
    }
}
