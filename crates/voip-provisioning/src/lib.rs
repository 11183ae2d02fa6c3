//! VoIP account provisioning service.
//!
//! Issues PJSIP accounts on demand:
//! - Generates a one-time secret disclosed only in the registration response
//! - Reserves identifiers so no account is ever provisioned twice
//! - Appends the account to the Asterisk configuration and reloads PJSIP over AMI

pub mod api;
pub mod config;
pub mod error;
pub mod pjsip;
pub mod provisioner;
pub mod registry;
pub mod reload;
pub mod secret;

pub use config::Config;
pub use error::ProvisioningError;
pub use provisioner::{ProvisionedAccount, Provisioner};
pub use registry::{AccountRecord, AccountRegistry, ProvisioningState, Registry, Store};
pub use reload::{ControlChannel, ReloadCoordinator};
