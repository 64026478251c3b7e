use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

/// 43 alphanumeric characters carry ~256 bits of entropy.
const TOKEN_LEN: usize = 43;

/// Source of unguessable activation and session tokens.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self) -> String;
}

/// Draws straight from the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsTokenIssuer;

impl TokenIssuer for OsTokenIssuer {
    fn issue(&self) -> String {
        OsRng
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect()
    }
}
