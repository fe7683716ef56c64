//! Bearer credential acquisition. Credential/token providers (SAS, OAuth,
//! ...) are used but not defined by this crate; this module only defines
//! the seam `ws-connection` calls through before every connect attempt.

use std::time::Duration;

use prx_error::PrxError;

/// A bearer token plus how long it stays valid. `ttl = None` means the
/// connection never schedules an expiry-driven disconnect for it.
#[derive(Debug, Clone)]
pub struct Token {
    pub value: String,
    pub ttl: Option<Duration>,
}

impl Token {
    pub fn new(value: impl Into<String>, ttl: Option<Duration>) -> Token {
        Token { value: value.into(), ttl }
    }
}

/// Acquires a fresh bearer token before each connect attempt. Implementations
/// typically perform a blocking HTTP exchange — the one suspension point
/// this crate's concurrency model allows outside the event port and
/// scheduler waits.
pub trait TokenProvider: Send + Sync {
    fn acquire(&self) -> Result<Token, PrxError>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Result<Token, PrxError> + Send + Sync,
{
    fn acquire(&self) -> Result<Token, PrxError> {
        self()
    }
}

/// Always returns the same token, unconditionally — useful for static
/// deployments (a fixed SAS token/connection string) and for tests.
pub struct StaticTokenProvider {
    token: Token,
}

impl StaticTokenProvider {
    pub fn new(token: Token) -> StaticTokenProvider {
        StaticTokenProvider { token }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn acquire(&self) -> Result<Token, PrxError> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_returns_same_token_every_time() {
        let provider = StaticTokenProvider::new(Token::new("abc", Some(Duration::from_secs(60))));
        let a = provider.acquire().unwrap();
        let b = provider.acquire().unwrap();
        assert_eq!(a.value, b.value);
        assert_eq!(a.ttl, b.ttl);
    }
}
