//! Identity and access core: password credentials, signed identity tokens,
//! per-call request authentication and gateway authorization decisions.
//! Keep the public surface thin and split implementation across sub-modules.

mod authenticator;
mod credentials;
mod decision;
mod secret;
mod token;

pub use authenticator::{extract_token, RequestAuthenticator};
pub use credentials::CredentialManager;
pub use decision::{decide, forbid, Decision, Effect, PolicyDocument, Statement, CONTEXT_USER_KEY, INVOKE_ACTION, POLICY_VERSION};
pub use secret::{load_signing_secret, EnvSecretStore, FileSecretStore, SecretStore, SigningSecret};
pub use token::{Claims, TokenCodec, TOKEN_LIFETIME_HOURS};
