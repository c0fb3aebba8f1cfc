use super::CommonOptions;
use anyhow::Result;
use clap::Args;

/// Print a lesson content file served by the server.
#[derive(Args)]
pub struct ContentCommand {
    /// The common command options.
    #[clap(flatten)]
    pub common: CommonOptions,

    /// The path of the file, relative to the server's content directory.
    #[clap(value_name = "FILE")]
    pub file: String,
}

impl ContentCommand {
    /// Executes the command.
    pub async fn exec(self) -> Result<()> {
        let client = self.common.create_client()?;
        let response = client.content(&self.file).await?;
        print!("{content}", content = response.content);
        Ok(())
    }
}
