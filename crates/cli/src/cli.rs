//! Argument definitions.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "datalift",
    version,
    about = "Upload directory snapshots to the data hub"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Initialize a data upload in the current directory.
    ///
    /// Writes the session record and a default ignore file; after that,
    /// `datalift upload` sends the directory contents.
    Init {
        /// Dataset display name.
        name: String,
        /// Owner namespace shown in the dataset's qualified name.
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Upload the current directory to the data hub.
    Upload {
        /// Resume an unfinished upload without prompting.
        #[arg(short, long)]
        resume: bool,
    },

    /// Show the state of the pending upload, if any.
    Status,
}
