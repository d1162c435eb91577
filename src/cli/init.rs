//! tagsync init command implementation
//!
//! Creates the store directory and writes a default `.tagsync.toml` when
//! none exists.

use std::path::{Path, PathBuf};

use crate::config::{Config, CONFIG_FILE};
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::storage::Storage;

#[derive(serde::Serialize)]
struct InitReport {
    root: PathBuf,
    store_dir: PathBuf,
    config_created: bool,
}

pub fn run(root: &Path, output: OutputOptions) -> Result<()> {
    let config_path = root.join(CONFIG_FILE);
    let config_created = !config_path.exists();
    let config = if config_created {
        let config = Config::default();
        config.save(&config_path)?;
        config
    } else {
        Config::load(&config_path)?
    };

    let storage = Storage::new(root.to_path_buf(), config.store_dir(root));
    storage.init()?;
    tracing::info!(dir = %storage.dir().display(), "initialized store");

    let report = InitReport {
        root: root.to_path_buf(),
        store_dir: storage.dir().to_path_buf(),
        config_created,
    };

    let mut human = HumanOutput::new("tagsync init: ready");
    human.push_summary("store", storage.dir().display().to_string());
    human.push_summary(
        "config",
        if config_created { "created" } else { "existing" },
    );

    emit_success(output, "init", &report, Some(&human))
}
