//! Delegated-access OAuth token broker.
//!
//! Brokers OAuth credentials on behalf of an operator acting for its
//! end-users, across a closed catalog of providers. The lifecycle it owns:
//!
//! - [`TokenBroker::register_app`]: store an operator's OAuth app
//! - [`TokenBroker::begin_authorization`]: mint state (+ PKCE) and build
//!   the provider authorization URL
//! - [`TokenBroker::complete_authorization`]: redeem a provider redirect,
//!   exchange the code, persist encrypted credentials
//! - [`TokenBroker::get_access_token`]: hand out live tokens, refreshing
//!   expired ones transparently
//!
//! Provider differences are data ([`ProviderQuirks`] on a descriptor), not
//! code paths keyed on provider names. Persistence goes through the
//! [`store::KeyValueStore`] seam (Redis in production, in-memory in tests),
//! and all provider traffic goes through the [`exchange::TokenExchanger`]
//! seam.

pub mod broker;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod ledger;
pub mod pkce;
pub mod registration;
pub mod registry;
pub mod store;
pub mod token;

pub use broker::{AuthorizationRequest, CompletedAuthorization, TokenBroker};
pub use crypto::FieldCipher;
pub use error::{BrokerError, Result};
pub use exchange::{HttpTokenExchanger, TokenExchanger};
pub use identity::IdentityKey;
pub use ledger::{StateLedger, StateRecord, DEFAULT_STATE_TTL};
pub use registration::{AppRegistration, RegistrationStore};
pub use registry::{ProviderDescriptor, ProviderQuirks, ProviderRegistry};
pub use store::{InMemoryStore, KeyValueStore, RedisStore};
pub use token::TokenSet;
