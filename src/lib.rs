//! Scrivia agent: a tool-calling turn orchestrator for streaming LLM backends.
//!
//! A turn streams a model round through a [`provider::ProviderAdapter`],
//! reassembles tool calls, runs them against a [`tools::CapabilityRegistry`],
//! feeds the results back and stops on a text answer, a stream failure or an
//! exhausted round budget. Finalized messages are committed through a
//! [`session::SessionStore`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scrivia_agent::prelude::*;
//!
//! # async fn example() -> scrivia_agent::error::Result<()> {
//! let config = ConfigFile::resolve(None)?;
//! let runner = TurnRunner::new(
//!     create_adapter(&config.provider)?,
//!     Arc::new(CapabilityRegistry::new()),
//!     Arc::new(MemorySessionStore::new()),
//!     config.agent,
//! );
//! let handle = runner.start_turn(TurnInput::new("session-1", "Hello!"), CallerIdentity::anonymous());
//! let result = handle.wait().await?;
//! println!("{:?}", result.final_text);
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod session;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
