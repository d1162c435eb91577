//! Command-line interface for tagsync
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::changes::{ChangeRecorder, DiscardChanges, OutstandingLog};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lock::FileLock;
use crate::model::{Tag, TaskRecord};
use crate::output::OutputOptions;
use crate::query::{TagCriterion, TaskCriterion};
use crate::storage::Storage;
use crate::store::{FileStore, TagStore};
use crate::tags::TagService;

mod changes;
mod init;
mod tag;
mod task;

/// tagsync - tag tasks and keep a per-row change trail for sync
#[derive(Parser, Debug)]
#[command(name = "tagsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root (defaults to current directory)
    #[arg(long, global = true, env = "TAGSYNC_ROOT")]
    pub root: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the store directory and default config
    Init,

    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Tag management
    #[command(subcommand)]
    Tag(TagCommands),

    /// Show outstanding change records
    Changes {
        /// Show only the most recent N records
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Add a task
    Add {
        title: String,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Mark a task completed
    Complete { task: String },

    /// Mark a task deleted
    Delete { task: String },

    /// Hide a task until a time (RFC 3339)
    Hide {
        task: String,
        #[arg(long)]
        until: String,
    },

    /// List tasks
    List {
        /// Only active, visible tasks without tags
        #[arg(long, conflicts_with = "tag")]
        untagged: bool,

        /// Only tasks carrying this tag
        #[arg(long)]
        tag: Option<String>,

        /// Include completed, deleted and hidden tasks
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TagCommands {
    /// Replace the tags of a task
    Set {
        task: String,
        names: Vec<String>,
    },

    /// Attach one tag to a task
    Add { task: String, name: String },

    /// Remove tags from a task
    Remove {
        task: String,
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Show the tags of a task
    Show { task: String },

    /// List all tags
    List,

    /// List tags with task counts
    Grouped {
        /// count_desc, count_asc, name_asc, name_desc
        #[arg(long)]
        order: Option<String>,

        /// Count every task, not just active ones
        #[arg(long)]
        all: bool,
    },

    /// Rename a tag (by name or uuid)
    Rename { tag: String, new_name: String },

    /// Show the stored capitalization of a tag name
    Case { name: String },

    /// Show the default image for a tag uuid or name
    Palette { identifier: String },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };
        let root = resolve_root(self.root);
        match self.command {
            Commands::Init => init::run(&root, output),
            // Needs no store.
            Commands::Tag(TagCommands::Palette { identifier }) => {
                tag::run_palette(output, &identifier)
            }
            Commands::Task(cmd) => task::run(Context::open(root, output)?, cmd),
            Commands::Tag(cmd) => tag::run(Context::open(root, output)?, cmd),
            Commands::Changes { limit } => changes::run(Context::open(root, output)?, limit),
        }
    }
}

fn resolve_root(root: Option<PathBuf>) -> PathBuf {
    root.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Everything a command needs: config, store and the tag engine.
pub(crate) struct Context {
    pub config: Config,
    pub storage: Storage,
    pub service: TagService<FileStore>,
    pub changes: Arc<dyn ChangeRecorder>,
    pub output: OutputOptions,
}

impl Context {
    fn open(root: PathBuf, output: OutputOptions) -> Result<Self> {
        let config = Config::load_from_root(&root);
        let storage = Storage::new(root.clone(), config.store_dir(&root));
        let changes: Arc<dyn ChangeRecorder> = if config.store.record_changes {
            Arc::new(OutstandingLog::new(
                storage.clone(),
                config.store.lock_timeout_ms,
            ))
        } else {
            Arc::new(DiscardChanges)
        };
        let store = FileStore::open(
            storage.clone(),
            config.store.lock_timeout_ms,
            Arc::clone(&changes),
        )?;
        Ok(Self {
            config,
            storage,
            service: TagService::new(store),
            changes,
            output,
        })
    }

    /// Serialize mutating commands across processes.
    fn lock_commands(&self) -> Result<FileLock> {
        FileLock::acquire(self.storage.command_lock(), self.config.store.lock_timeout_ms)
    }

    /// Look up a task by row id or uuid.
    fn find_task(&self, key: &str) -> Result<TaskRecord> {
        let criterion = match key.trim().parse::<i64>() {
            Ok(id) => TaskCriterion::Id(id),
            Err(_) => TaskCriterion::Uuid(key.trim().to_string()),
        };
        self.service
            .store()
            .query_tasks(&criterion)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::TaskNotFound(key.to_string()))
    }

    /// Look up an existing tag by uuid, then by name (any case).
    fn find_tag(&self, key: &str) -> Result<Tag> {
        let store = self.service.store();
        if let Some(tag) = store.find_tag(&TagCriterion::Uuid(key.to_string()))? {
            return Ok(tag);
        }
        store
            .find_tag(&TagCriterion::NameIgnoreCase(key.to_string()))?
            .ok_or_else(|| Error::TagNotFound(key.to_string()))
    }
}

/// Drop blank names; callers of the engine filter them.
fn clean_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
