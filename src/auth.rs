//! Bearer-token identity: HS256-signed tokens naming a registered user.

use std::ops::Deref;
use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::future::LocalBoxFuture;
use hmac::{Hmac, Mac};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{ChatError, ChatResult};
use crate::store::{User, UserStore};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
}

/// Signs and checks compact `header.payload.signature` tokens with a shared secret.
pub struct TokenIssuer {
    secret: Vec<u8>,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, signing_input: &str) -> ChatResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| ChatError::Auth("invalid signing key".to_string()))?;
        mac.update(signing_input.as_bytes());
        Ok(mac)
    }

    pub fn issue(&self, username: &str) -> ChatResult<String> {
        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            sub: username.to_string(),
        };
        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);
        let signature = self.mac(&signing_input)?.finalize().into_bytes();
        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Returns the username the token was issued for.
    pub fn verify(&self, token: &str) -> ChatResult<String> {
        let invalid = || ChatError::Auth("Invalid token".to_string());

        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;
        self.mac(&format!("{}.{}", header, payload))?
            .verify_slice(&signature)
            .map_err(|_| invalid())?;

        let header: Header = decode_segment(header).ok_or_else(invalid)?;
        if header.alg != "HS256" {
            return Err(invalid());
        }
        let claims: Claims = decode_segment(payload).ok_or_else(invalid)?;
        if claims.sub.is_empty() {
            return Err(invalid());
        }
        Ok(claims.sub)
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Option<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn encode_segment<T: Serialize>(value: &T) -> ChatResult<String> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| ChatError::Auth(format!("cannot encode token: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Resolves bearer credentials to registered users.
#[derive(Clone)]
pub struct Identity {
    issuer: Arc<TokenIssuer>,
    users: Arc<dyn UserStore>,
}

impl Identity {
    pub fn new(secret: &str, users: Arc<dyn UserStore>) -> Self {
        Self {
            issuer: Arc::new(TokenIssuer::new(secret)),
            users,
        }
    }

    pub fn issue(&self, user: &User) -> ChatResult<String> {
        self.issuer.issue(&user.username)
    }

    pub async fn resolve(&self, credential: &str) -> ChatResult<User> {
        let username = self.issuer.verify(credential)?;
        self.users
            .find_by_username(&username)
            .await?
            .ok_or_else(|| ChatError::Auth("User not found".to_string()))
    }
}

/// Extractor for handlers that require a signed-in user.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl Deref for AuthenticatedUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

impl FromRequest for AuthenticatedUser {
    type Error = ChatError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let credential = bearer_token(req);
        Box::pin(async move {
            let state = state.ok_or_else(|| ChatError::Storage("application state missing".to_string()))?;
            let credential = credential.ok_or_else(|| {
                debug!("Request without bearer credentials");
                ChatError::Auth("Not authenticated".to_string())
            })?;
            state.identity.resolve(&credential).await.map(AuthenticatedUser)
        })
    }
}
