//! # mailburst
//!
//! Bulk email dispatch over SMTP with bounded concurrency and automatic
//! retry of transient failures.
//!
//! This crate provides:
//! - [`DispatchPool`]: a fixed set of worker tasks fed by a bounded queue,
//!   producing exactly one [`DispatchResult`] per queued message
//! - [`RetryPolicy`]: exponential backoff with failure classification
//! - [`Config`]: settings loaded from the environment
//!
//! Each message is delivered in its own session by [`mailburst_smtp::Mailer`].
//!
//! ```ignore
//! use mailburst::{Config, DispatchPool};
//!
//! #[tokio::main]
//! async fn main() -> mailburst::Result<()> {
//!     let config = Config::from_env()?;
//!     let pool = DispatchPool::from_config(&config);
//!
//!     let messages = vec![pool.message("you@example.com", "Hello", "Hi there")];
//!     for result in pool.process_all(messages).await? {
//!         println!("{} -> {}", result.message.to, result.success);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod pool;
pub mod retry;

pub use config::Config;
pub use error::{Error, Result, SubmitError};
pub use mailburst_smtp::Message;
pub use pool::{DispatchPool, DispatchResult, Lifecycle};
pub use retry::{Backoff, RetryOutcome, RetryPolicy, should_retry};
