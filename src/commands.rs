//! Commands for the `apilab` tool.

use anyhow::Result;
use apilab_client::{Client, DEFAULT_URL};
use clap::Args;

mod content;
mod send;

pub use self::content::*;
pub use self::send::*;

/// Common options for commands.
#[derive(Args)]
pub struct CommonOptions {
    /// The URL of the API Lab server to use.
    #[clap(long, value_name = "URL", env = "APILAB_URL", default_value = DEFAULT_URL)]
    pub server: String,
}

impl CommonOptions {
    /// Creates the API client to use.
    pub fn create_client(&self) -> Result<Client> {
        Client::new(self.server.as_str())
    }
}
