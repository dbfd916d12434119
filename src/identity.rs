/// Identity Provider seam
///
/// Credentials and sessions are managed by an external provider; the engine
/// only needs to know who is acting. The HTTP facade receives the provider's
/// HS256 tokens and turns them into a [`Principal`].
use crate::error::{ConsoleError, ConsoleResult};
use serde::{Deserialize, Serialize};

/// Authenticated operator identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
        }
    }
}

/// Source of the current principal
pub trait IdentityProvider: Send + Sync {
    fn current_principal(&self) -> Option<Principal>;
}

/// Provider with a fixed principal (CLI use and tests)
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    principal: Option<Principal>,
}

impl StaticIdentity {
    pub fn new(principal: Option<Principal>) -> Self {
        Self { principal }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_principal(&self) -> Option<Principal> {
        self.principal.clone()
    }
}

/// Claims carried by provider-issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

/// Verify a provider token and extract the principal
pub fn verify_token(token: &str, secret: &str) -> ConsoleResult<Principal> {
    use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (5 minutes)
    validation.leeway = 300;

    let data = decode::<TokenClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::warn!("Token verification failed: {}", e);
        match e.kind() {
            ErrorKind::ExpiredSignature => {
                ConsoleError::Authentication("Token has expired".to_string())
            }
            ErrorKind::InvalidSignature => {
                ConsoleError::Authentication("Invalid token signature".to_string())
            }
            _ => ConsoleError::Authentication(format!("Invalid token: {}", e)),
        }
    })?;

    Ok(Principal::new(data.claims.sub, data.claims.email))
}

/// Issue a token for a principal (operator tooling and tests)
pub fn issue_token(principal: &Principal, secret: &str, ttl_secs: i64) -> ConsoleResult<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let exp = (chrono::Utc::now().timestamp() + ttl_secs).max(0) as usize;
    let claims = TokenClaims {
        sub: principal.id.clone(),
        email: principal.email.clone(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ConsoleError::Internal(format!("Failed to sign token: {}", e)))
}
