//! claim-auth: reserve-then-claim sign-in.
//!
//! Administrators pre-register people by email ([`Registrar`]). On first
//! sign-in the [`SignInService`] finds that reservation
//! ([`ReservationLocator`]), has the credential provider create the
//! identity, and links it back ([`IdentityBinder`]). Emails nobody reserved
//! cannot self-register.

pub mod binder;
pub mod locator;
pub mod messages;
pub mod options;
pub mod profile;
pub mod provider;
pub mod registrar;
pub mod service;
pub mod session;
pub mod validation;

pub use binder::*;
pub use locator::*;
pub use messages::*;
pub use options::*;
pub use profile::*;
pub use provider::*;
pub use registrar::*;
pub use service::*;
pub use session::*;
pub use validation::*;
