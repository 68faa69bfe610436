//! Configuration types for shardstore
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Storage node address parsing
//!
//! Home directory, ports and node locations all end up in a
//! [`StoreConfig`] that is handed to each component at start-up.

use crate::error::ConfigError;
use crate::namespace::{Category, Namespace};
use crate::protocol::{Framing, Wire, DEFAULT_CHUNK_SIZE};
use crate::storage::{ArchiveBuilder, BuiltinTar, ExternalTar};
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

/// Chunk size limits
const MIN_CHUNK_SIZE: usize = 64;
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Host every component binds and connects to by default
const DEFAULT_HOST: &str = "127.0.0.1";

/// Regex for `--node <category>=<host>:<port>`
static NODE_SPEC_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.?([A-Za-z]+)=([^\s:=]+):(\d{1,5})$").expect("Invalid node spec regex")
});

/// Type-sharded file store
#[derive(Parser, Debug, Clone)]
#[command(
    name = "shardstore",
    version,
    about = "Type-sharded file store with a routing coordinator",
    long_about = "Files are partitioned across storage nodes by extension.\n\n\
                  The coordinator serves .c files itself and proxies .pdf and .txt\n\
                  requests to the nodes owning them, rewriting ~/smain paths into\n\
                  ~/spdf and ~/stext on the way.",
    after_help = "EXAMPLES:\n    \
        shardstore node pdf\n    \
        shardstore node txt\n    \
        shardstore coordinator --node pdf=127.0.0.1:6061 --node txt=127.0.0.1:6062\n    \
        shardstore client upload notes.txt ~/smain/work\n    \
        shardstore client display ~/smain/work\n    \
        shardstore --framing framed client tar .txt -o text.tar"
)]
pub struct CliArgs {
    /// Role to run
    #[command(subcommand)]
    pub command: Command,

    /// Directory `~` expands to and under which namespace roots live
    #[arg(long, env = "SHARDSTORE_HOME", global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Payload framing; every component of a deployment must agree
    #[arg(long, value_enum, default_value_t = Framing::Legacy, global = true)]
    pub framing: Framing,

    /// Payload chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, global = true, value_name = "BYTES")]
    pub chunk_size: usize,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the coordinator (serves .c files, routes the rest)
    Coordinator {
        /// Bind address
        #[arg(long, default_value = DEFAULT_HOST)]
        bind: String,

        /// Port to listen on
        #[arg(long, default_value_t = Category::Source.default_port())]
        port: u16,

        /// Storage node location, e.g. pdf=10.0.0.2:6061 (can be repeated)
        #[arg(long = "node", value_name = "CATEGORY=HOST:PORT", action = clap::ArgAction::Append)]
        nodes: Vec<String>,

        #[command(flatten)]
        archive: ArchiveArgs,
    },

    /// Run a storage node for one category
    Node {
        /// Category owned by this node (pdf or txt)
        #[arg(value_name = "CATEGORY")]
        category: String,

        /// Bind address
        #[arg(long, default_value = DEFAULT_HOST)]
        bind: String,

        /// Port to listen on (defaults to the category's conventional port)
        #[arg(long)]
        port: Option<u16>,

        #[command(flatten)]
        archive: ArchiveArgs,
    },

    /// Send a single request to a coordinator
    Client {
        /// Coordinator address
        #[arg(long, default_value = "127.0.0.1:6060", value_name = "HOST:PORT")]
        server: String,

        #[command(subcommand)]
        action: ClientAction,
    },
}

/// Archive builder selection
#[derive(clap::Args, Debug, Clone)]
pub struct ArchiveArgs {
    /// Archive builder used for dtar
    #[arg(long, value_enum, default_value_t = ArchiverKind::External)]
    pub archiver: ArchiverKind,

    /// Program run by the external archiver
    #[arg(long, default_value = "tar", value_name = "PROGRAM")]
    pub tar_program: PathBuf,
}

/// Available archive builders
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ArchiverKind {
    /// Run the system tar program
    External,
    /// Build archives in-process
    Builtin,
}

impl ArchiveArgs {
    pub fn builder(&self) -> Arc<dyn ArchiveBuilder> {
        match self.archiver {
            ArchiverKind::External => Arc::new(ExternalTar::new(self.tar_program.clone())),
            ArchiverKind::Builtin => Arc::new(BuiltinTar),
        }
    }
}

/// One-shot client requests
#[derive(Subcommand, Debug, Clone)]
pub enum ClientAction {
    /// Upload a local file into a destination directory
    Upload {
        /// Local file to send
        file: PathBuf,
        /// Destination directory, e.g. ~/smain/work
        destination: String,
    },

    /// Download a file into the current directory
    Download {
        /// Remote path, e.g. ~/smain/work/notes.txt
        path: String,
        /// Local output file (defaults to the remote file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a remote file
    Remove {
        /// Remote path
        path: String,
    },

    /// Download an archive of every file with an extension
    Tar {
        /// Extension filter, e.g. .txt
        extension: String,
        /// Local output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List matching files under a directory on every node
    Display {
        /// Remote directory, e.g. ~/smain/work
        path: String,
    },
}

/// Location of a storage node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `<category>=<host>:<port>`
    pub fn parse_spec(spec: &str) -> Result<(Category, Self), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidNodeAddress {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let caps = NODE_SPEC_REGEX
            .captures(spec.trim())
            .ok_or_else(|| invalid("expected <category>=<host>:<port>"))?;

        let category = caps[1].parse::<Category>()?;
        let port = caps[3]
            .parse::<u16>()
            .map_err(|_| invalid("port out of range"))?;

        Ok((category, Self::new(&caps[2], port)))
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Validated configuration shared by every component
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Home directory, namespace roots and the coordinator's category
    pub namespace: Namespace,

    /// Payload framing and chunk size
    pub wire: Wire,

    /// Storage node for every category the coordinator does not serve
    pub nodes: HashMap<Category, NodeAddr>,

    /// Archive builder used for `dtar`
    pub archiver: Arc<dyn ArchiveBuilder>,
}

impl StoreConfig {
    /// Defaults for a home directory: legacy framing, nodes on localhost
    pub fn new(home: impl Into<PathBuf>) -> Self {
        let local = Category::Source;
        let nodes = Category::ALL
            .iter()
            .filter(|c| **c != local)
            .map(|c| (*c, NodeAddr::new(DEFAULT_HOST, c.default_port())))
            .collect();

        Self {
            namespace: Namespace::new(home, local),
            wire: Wire::legacy(),
            nodes,
            archiver: Arc::new(ExternalTar::default()),
        }
    }

    pub fn with_wire(mut self, wire: Wire) -> Self {
        self.wire = wire;
        self
    }

    pub fn with_node(mut self, category: Category, addr: NodeAddr) -> Self {
        self.nodes.insert(category, addr);
        self
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn ArchiveBuilder>) -> Self {
        self.archiver = archiver;
        self
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let home = match &args.home {
            Some(home) => home.clone(),
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .ok_or(ConfigError::NoHomeDirectory)?,
        };

        if args.chunk_size < MIN_CHUNK_SIZE || args.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize {
                size: args.chunk_size,
                min: MIN_CHUNK_SIZE,
                max: MAX_CHUNK_SIZE,
            });
        }

        let mut config = Self::new(home).with_wire(Wire::new(args.framing, args.chunk_size));

        match &args.command {
            Command::Coordinator { nodes, archive, .. } => {
                for spec in nodes {
                    let (category, addr) = NodeAddr::parse_spec(spec)?;
                    if category == config.namespace.local_category() {
                        return Err(ConfigError::InvalidNodeAddress {
                            spec: spec.clone(),
                            reason: format!("{} files are served by the coordinator", category),
                        });
                    }
                    config = config.with_node(category, addr);
                }
                config = config.with_archiver(archive.builder());
            }
            Command::Node { archive, .. } => {
                config = config.with_archiver(archive.builder());
            }
            Command::Client { .. } => {}
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that every remote category has a node
    pub fn validate(&self) -> Result<(), ConfigError> {
        let local = self.namespace.local_category();
        for category in Category::ALL {
            if category != local && !self.nodes.contains_key(&category) {
                return Err(ConfigError::MissingNode(category));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_spec() {
        let (category, addr) = NodeAddr::parse_spec("pdf=10.0.0.2:7001").unwrap();
        assert_eq!(category, Category::Document);
        assert_eq!(addr, NodeAddr::new("10.0.0.2", 7001));
        assert_eq!(addr.to_string(), "10.0.0.2:7001");

        let (category, _) = NodeAddr::parse_spec(".txt=localhost:6062").unwrap();
        assert_eq!(category, Category::Text);
    }

    #[test]
    fn test_parse_invalid_node_spec() {
        assert!(NodeAddr::parse_spec("pdf").is_err());
        assert!(NodeAddr::parse_spec("pdf=host").is_err());
        assert!(NodeAddr::parse_spec("pdf=host:99999").is_err());
        assert!(matches!(
            NodeAddr::parse_spec("png=host:1"),
            Err(ConfigError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("/home/alice");
        assert_eq!(config.wire, Wire::legacy());
        assert_eq!(config.namespace.local_category(), Category::Source);
        assert_eq!(
            config.nodes.get(&Category::Text),
            Some(&NodeAddr::new("127.0.0.1", 6062))
        );
        assert!(config.nodes.get(&Category::Source).is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_args() {
        let args = CliArgs::parse_from([
            "shardstore",
            "--home",
            "/srv/store",
            "--framing",
            "framed",
            "coordinator",
            "--node",
            "pdf=10.0.0.2:7001",
            "--archiver",
            "builtin",
        ]);
        let config = StoreConfig::from_args(&args).unwrap();
        assert_eq!(config.wire.framing, Framing::Framed);
        assert_eq!(config.namespace.home(), std::path::Path::new("/srv/store"));
        assert_eq!(
            config.nodes.get(&Category::Document),
            Some(&NodeAddr::new("10.0.0.2", 7001))
        );
        assert_eq!(
            config.nodes.get(&Category::Text),
            Some(&NodeAddr::new("127.0.0.1", 6062))
        );
    }

    #[test]
    fn test_from_args_rejects_bad_values() {
        let args = CliArgs::parse_from([
            "shardstore",
            "--home",
            "/srv/store",
            "--chunk-size",
            "4",
            "node",
            "pdf",
        ]);
        assert!(matches!(
            StoreConfig::from_args(&args),
            Err(ConfigError::InvalidChunkSize { .. })
        ));

        let args = CliArgs::parse_from([
            "shardstore",
            "--home",
            "/srv/store",
            "coordinator",
            "--node",
            "c=10.0.0.2:7001",
        ]);
        assert!(matches!(
            StoreConfig::from_args(&args),
            Err(ConfigError::InvalidNodeAddress { .. })
        ));
    }
}
