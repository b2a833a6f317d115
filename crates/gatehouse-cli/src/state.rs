//! Session-state inspection commands.

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;

use gatehouse_core::{SessionStore, StoreError};

#[derive(Debug, Subcommand)]
pub enum StateCommand {
    /// Print a session's state as JSON
    Show { session_id: String },
    /// Tear a session down, discarding its state
    Clear { session_id: String },
    /// List every live session id
    List,
}

pub fn run(store: Arc<dyn SessionStore>, command: StateCommand) -> Result<()> {
    match command {
        StateCommand::Show { session_id } => match store.get(&session_id) {
            Ok(state) => {
                println!("{}", serde_json::to_string_pretty(&state)?);
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                anyhow::bail!("no state for session: {session_id}")
            }
            Err(err) => Err(err.into()),
        },
        StateCommand::Clear { session_id } => {
            store.teardown(&session_id)?;
            println!("cleared {session_id}");
            Ok(())
        }
        StateCommand::List => {
            for id in store.list_sessions()? {
                println!("{id}");
            }
            Ok(())
        }
    }
}
