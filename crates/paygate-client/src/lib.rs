//! Paygate Client SDK.
//!
//! Used by the metered product's request handlers to charge operations and
//! validate customer API keys before doing any work.
//!
//! # Example
//!
//! ```no_run
//! use paygate_client::PaygateClient;
//!
//! # async fn example() -> Result<(), paygate_client::ClientError> {
//! let client = PaygateClient::new("http://paygate:8080", "your-service-key")?;
//!
//! let outcome = client.authorize_and_charge(Some("sk_..."), "merge").await?;
//! if !outcome.authorized {
//!     println!("refused: {:?}", outcome.validation.error);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, PaygateClient};
pub use error::ClientError;
pub use types::*;
