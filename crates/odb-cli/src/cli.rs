use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "odb",
    about = "Git-compatible object database plumbing",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository directory (the equivalent of a bare `.git`)
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    pub repo: PathBuf,

    /// Database settings (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create HEAD and config in the repository directory
    Init,
    /// Compute an object id, optionally storing the object
    HashObject(HashObjectArgs),
    /// Show an object's type, size or content
    CatFile(CatFileArgs),
    /// Resolve a revision to an object id
    RevParse(RevParseArgs),
    /// Point a ref at an object
    UpdateRef(UpdateRefArgs),
    /// Read or change the branch HEAD names
    SymbolicRef(SymbolicRefArgs),
    /// List the entries of a tree
    LsTree(LsTreeArgs),
    /// List refs and the ids they resolve to
    ShowRef(ShowRefArgs),
}

#[derive(Args)]
pub struct HashObjectArgs {
    /// File to hash, or `-` for stdin
    pub file: PathBuf,
    /// Object type
    #[arg(short = 't', long = "type", default_value = "blob")]
    pub kind: String,
    /// Store the object in the database
    #[arg(short = 'w')]
    pub write: bool,
}

#[derive(Args)]
pub struct CatFileArgs {
    #[command(flatten)]
    pub mode: CatFileMode,
    pub rev: String,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct CatFileMode {
    /// Print the object type
    #[arg(short = 't')]
    pub kind: bool,
    /// Print the body size in bytes
    #[arg(short = 's')]
    pub size: bool,
    /// Pretty-print the content
    #[arg(short = 'p')]
    pub pretty: bool,
}

#[derive(Args)]
pub struct RevParseArgs {
    pub rev: String,
}

#[derive(Args)]
pub struct UpdateRefArgs {
    /// Full ref name, e.g. `refs/heads/main`
    pub name: String,
    /// Revision the ref should point at
    pub rev: String,
}

#[derive(Args)]
pub struct SymbolicRefArgs {
    /// New target for HEAD; prints the current one when omitted
    pub target: Option<String>,
}

#[derive(Args)]
pub struct LsTreeArgs {
    /// Tree, or commit whose tree to list
    pub rev: String,
}

#[derive(Args)]
pub struct ShowRefArgs {
    #[arg(default_value = "refs")]
    pub prefix: String,
}
