use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio: versioned wiki storage administration",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Wiki configuration file
    #[arg(short, long, global = true, default_value = "folio.toml")]
    pub config: PathBuf,

    /// More log output; repeat for more
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or destroy the revision storage
    Storage {
        #[command(subcommand)]
        action: StorageAction,
    },
    /// Maintain the indexes
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Write every revision to a backup file
    Save(SaveArgs),
    /// Restore revisions from a backup file and reindex
    Load(LoadArgs),
    /// Read or write items as a user
    Item {
        #[command(subcommand)]
        action: ItemAction,
    },
    /// Evaluate ACLs
    Acl {
        #[command(subcommand)]
        action: AclAction,
    },
}

#[derive(Subcommand)]
pub enum StorageAction {
    /// Create empty backends
    Create,
    /// Remove the backends and all revisions in them
    Destroy,
}

#[derive(Args)]
pub struct TmpArgs {
    /// Act on the temporary index location
    #[arg(long)]
    pub tmp: bool,
}

#[derive(Subcommand)]
pub enum IndexAction {
    /// Create empty indexes
    Create(TmpArgs),
    /// Remove the indexes
    Destroy(TmpArgs),
    /// Index every stored revision
    Build(TmpArgs),
    /// Reconcile the indexes with storage
    Update(TmpArgs),
    /// Replace the main indexes with the temporary ones
    Move,
    /// Compact the index journals
    Optimize(TmpArgs),
    /// Print indexed documents
    Dump(DumpArgs),
}

#[derive(Args)]
pub struct DumpArgs {
    #[arg(long)]
    pub tmp: bool,
    /// Dump all revisions instead of the latest per item
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct SaveArgs {
    /// Backup file to write
    #[arg(short, long)]
    pub file: PathBuf,
}

#[derive(Args)]
pub struct LoadArgs {
    /// Backup file to read
    #[arg(short, long)]
    pub file: PathBuf,
    /// Move a namespace while loading, as OLD:NEW
    #[arg(long, value_name = "OLD:NEW")]
    pub rename_ns: Option<String>,
    /// Skip a namespace while loading
    #[arg(long)]
    pub kill_ns: Option<String>,
}

#[derive(Args)]
pub struct UserArgs {
    /// Act as this user; anonymous when unset
    #[arg(short, long)]
    pub user: Option<String>,
}

#[derive(Subcommand)]
pub enum ItemAction {
    /// Print the current revision's metadata and text
    Show {
        fqname: String,
        #[command(flatten)]
        user: UserArgs,
    },
    /// Store a file as a new revision
    Put {
        fqname: String,
        /// File with the new content
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long, default_value = "text/plain;charset=utf-8")]
        contenttype: String,
        #[arg(short = 'm', long)]
        comment: Option<String>,
        #[command(flatten)]
        user: UserArgs,
    },
    /// List an item's revisions, oldest first
    History {
        fqname: String,
        #[command(flatten)]
        user: UserArgs,
    },
}

#[derive(Subcommand)]
pub enum AclAction {
    /// Tell whether a user holds a right on an item
    Check {
        fqname: String,
        right: String,
        #[command(flatten)]
        user: UserArgs,
    },
    /// Print the full ACLs that apply to an item
    Show {
        fqname: String,
    },
}
