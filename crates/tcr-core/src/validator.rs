use tracing::warn;

use crate::backend::KvBackend;
use crate::error::{Result, TokenError};
use crate::store::TokenStore;
use crate::token::{check_format, normalize_code, Redemption};

/// Read-only lookup against the active token set.
pub struct Validator<'a, B: KvBackend> {
    store: &'a TokenStore<B>,
}

impl<'a, B: KvBackend> Validator<'a, B> {
    pub fn new(store: &'a TokenStore<B>) -> Self {
        Self { store }
    }

    pub fn validate(&self, input: &str) -> Result<Redemption> {
        let code = normalize_code(input);
        check_format(&code)?;

        let tokens = match self.store.load_all() {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Denying {} because the store is unreadable: {}", code, e);
                return Err(TokenError::NotFoundOrUsed(code));
            }
        };

        tokens
            .iter()
            .find(|t| t.code == code && !t.used)
            .map(Redemption::from)
            .ok_or(TokenError::NotFoundOrUsed(code))
    }
}
