//! tagsync tag command implementation

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::model::{TagCount, TaskTag, UpsertOutcome};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::palette::{palette_image, palette_index};
use crate::query::{TagOrder, TaskCriterion};
use crate::tags::SyncReport;

use super::{clean_names, Context, TagCommands};

#[derive(serde::Serialize)]
struct SetReport {
    task_id: i64,
    sync: SyncReport,
    tags: Vec<TaskTag>,
}

#[derive(serde::Serialize)]
struct AddReport {
    task_id: i64,
    tag: String,
    inserted: bool,
}

#[derive(serde::Serialize)]
struct RemoveReport {
    task_id: i64,
    removed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unknown: Vec<String>,
}

#[derive(serde::Serialize)]
struct ShowReport {
    task_id: i64,
    tags: Vec<TaskTag>,
}

#[derive(serde::Serialize)]
struct ListedTag {
    uuid: String,
    name: String,
    image: &'static str,
}

#[derive(serde::Serialize)]
struct GroupedReport {
    order: &'static str,
    tags: Vec<TagCount>,
}

#[derive(serde::Serialize)]
struct RenameReport {
    uuid: String,
    name: String,
    links_updated: usize,
}

#[derive(serde::Serialize)]
struct CaseReport {
    input: String,
    canonical: String,
}

#[derive(serde::Serialize)]
struct PaletteReport {
    identifier: String,
    index: usize,
    image: &'static str,
}

pub fn run(ctx: Context, cmd: TagCommands) -> Result<()> {
    match cmd {
        TagCommands::Set { task, names } => run_set(&ctx, &task, &names),
        TagCommands::Add { task, name } => run_add(&ctx, &task, &name),
        TagCommands::Remove { task, names } => run_remove(&ctx, &task, &names),
        TagCommands::Show { task } => run_show(&ctx, &task),
        TagCommands::List => run_list(&ctx),
        TagCommands::Grouped { order, all } => run_grouped(&ctx, order.as_deref(), all),
        TagCommands::Rename { tag, new_name } => run_rename(&ctx, &tag, &new_name),
        TagCommands::Case { name } => run_case(&ctx, &name),
        TagCommands::Palette { identifier } => run_palette(ctx.output, &identifier),
    }
}

fn run_set(ctx: &Context, key: &str, names: &[String]) -> Result<()> {
    let _lock = ctx.lock_commands()?;
    let task = ctx.find_task(key)?;
    let desired: HashSet<String> = clean_names(names).into_iter().collect();
    let sync = ctx.service.synchronize(&task, &desired)?;
    let tags = ctx.service.tags_for_task(&task)?;

    let mut human = HumanOutput::new(format!("tagsync tag set: {}", task.id));
    human.push_summary("created", sync.created.len().to_string());
    human.push_summary("removed", sync.tombstoned.len().to_string());
    human.push_summary("unchanged", sync.unchanged.to_string());
    for tag in &tags {
        human.push_detail(tag.name.clone());
    }

    emit_success(
        ctx.output,
        "tag set",
        &SetReport {
            task_id: task.id,
            sync,
            tags,
        },
        Some(&human),
    )
}

fn run_add(ctx: &Context, key: &str, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument("tag name cannot be empty".to_string()));
    }

    let _lock = ctx.lock_commands()?;
    let task = ctx.find_task(key)?;
    let outcome = ctx.service.create_link(&task, name)?;
    let tag = ctx.service.find_canonical_case(name)?;
    let inserted = matches!(outcome, UpsertOutcome::Inserted(_));

    let mut human = HumanOutput::new(format!("tagsync tag add: {}", task.id));
    human.push_summary("tag", tag.clone());
    human.push_summary("link", if inserted { "created" } else { "already present" });

    emit_success(
        ctx.output,
        "tag add",
        &AddReport {
            task_id: task.id,
            tag,
            inserted,
        },
        Some(&human),
    )
}

fn run_remove(ctx: &Context, key: &str, names: &[String]) -> Result<()> {
    let _lock = ctx.lock_commands()?;
    let task = ctx.find_task(key)?;

    let mut uuids = Vec::new();
    let mut unknown = Vec::new();
    for name in clean_names(names) {
        match ctx.find_tag(&name) {
            Ok(tag) => uuids.push(tag.uuid),
            Err(Error::TagNotFound(_)) => unknown.push(name),
            Err(err) => return Err(err),
        }
    }
    let removed = ctx.service.delete_links(&task, &uuids)?;

    let mut human = HumanOutput::new(format!("tagsync tag remove: {}", task.id));
    human.push_summary("removed", removed.to_string());
    for name in &unknown {
        human.push_warning(format!("unknown tag: {name}"));
    }

    emit_success(
        ctx.output,
        "tag remove",
        &RemoveReport {
            task_id: task.id,
            removed,
            unknown,
        },
        Some(&human),
    )
}

fn run_show(ctx: &Context, key: &str) -> Result<()> {
    let task = ctx.find_task(key)?;
    let tags = ctx.service.tags_for_task(&task)?;

    let mut human = HumanOutput::new(format!("tagsync tag show: {}", task.id));
    human.push_summary("tags", tags.len().to_string());
    for tag in &tags {
        human.push_detail(tag.name.clone());
    }

    emit_success(
        ctx.output,
        "tag show",
        &ShowReport {
            task_id: task.id,
            tags,
        },
        Some(&human),
    )
}

fn run_list(ctx: &Context) -> Result<()> {
    let tags: Vec<ListedTag> = ctx
        .service
        .all_tags()?
        .into_iter()
        .map(|tag| ListedTag {
            image: palette_image(&tag.uuid),
            uuid: tag.uuid,
            name: tag.name,
        })
        .collect();

    let mut human = HumanOutput::new(format!("tagsync tag list: {} tag(s)", tags.len()));
    for tag in &tags {
        human.push_detail(tag.name.clone());
    }

    emit_success(ctx.output, "tag list", &tags, Some(&human))
}

fn run_grouped(ctx: &Context, order: Option<&str>, all: bool) -> Result<()> {
    let order = match order {
        Some(raw) => TagOrder::parse(raw)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown order: {raw}")))?,
        None => ctx.config.tags.default_order,
    };
    let filter = if all {
        TaskCriterion::All
    } else if ctx.config.tags.include_hidden {
        TaskCriterion::Active
    } else {
        TaskCriterion::active_visible()
    };
    let tags = ctx.service.grouped_tags(order, filter)?.to_vec()?;

    let mut human = HumanOutput::new(format!("tagsync tag grouped: {} tag(s)", tags.len()));
    for row in &tags {
        human.push_detail(format!("{} ({})", row.tag.name, row.count));
    }

    emit_success(
        ctx.output,
        "tag grouped",
        &GroupedReport {
            order: order.as_str(),
            tags,
        },
        Some(&human),
    )
}

fn run_rename(ctx: &Context, key: &str, new_name: &str) -> Result<()> {
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Err(Error::InvalidArgument("new tag name cannot be empty".to_string()));
    }

    let _lock = ctx.lock_commands()?;
    let tag = ctx.find_tag(key)?;
    let links_updated = ctx.service.rename(&tag.uuid, new_name)?;

    let mut human = HumanOutput::new(format!("tagsync tag rename: {} -> {new_name}", tag.name));
    human.push_summary("links updated", links_updated.to_string());

    emit_success(
        ctx.output,
        "tag rename",
        &RenameReport {
            uuid: tag.uuid,
            name: new_name.to_string(),
            links_updated,
        },
        Some(&human),
    )
}

fn run_case(ctx: &Context, name: &str) -> Result<()> {
    let canonical = ctx.service.find_canonical_case(name)?;

    let human = HumanOutput::new(canonical.clone());
    emit_success(
        ctx.output,
        "tag case",
        &CaseReport {
            input: name.to_string(),
            canonical,
        },
        Some(&human),
    )
}

pub(super) fn run_palette(output: OutputOptions, identifier: &str) -> Result<()> {
    let index = palette_index(identifier);
    let image = crate::palette::DEFAULT_TAG_IMAGES[index];

    let human = HumanOutput::new(format!("{image} ({index})"));
    emit_success(
        output,
        "tag palette",
        &PaletteReport {
            identifier: identifier.to_string(),
            index,
            image,
        },
        Some(&human),
    )
}
