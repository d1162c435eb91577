//! tagsync task command implementation
//!
//! Minimal task management so tags have something to attach to.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::model::{TaskRecord, TaskUpdate};
use crate::output::{emit_success, HumanOutput};
use crate::query::TaskCriterion;
use crate::store::TagStore;
use crate::tags::{tasks_with_tag, untagged_criterion};

use super::{clean_names, Context, TaskCommands};

#[derive(serde::Serialize)]
struct TaskReport {
    task: TaskRecord,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

#[derive(serde::Serialize)]
struct TaskListReport {
    tasks: Vec<TaskRecord>,
}

pub fn run(ctx: Context, cmd: TaskCommands) -> Result<()> {
    match cmd {
        TaskCommands::Add { title, tags } => run_add(&ctx, title, &tags),
        TaskCommands::Complete { task } => run_update(
            &ctx,
            "task complete",
            &task,
            TaskUpdate {
                completed_at: Some(Utc::now()),
                ..TaskUpdate::default()
            },
        ),
        TaskCommands::Delete { task } => run_update(
            &ctx,
            "task delete",
            &task,
            TaskUpdate {
                deleted_at: Some(Utc::now()),
                ..TaskUpdate::default()
            },
        ),
        TaskCommands::Hide { task, until } => {
            let until = DateTime::parse_from_rfc3339(until.trim())
                .map_err(|err| {
                    Error::InvalidArgument(format!("invalid --until '{until}': {err}"))
                })?
                .with_timezone(&Utc);
            run_update(
                &ctx,
                "task hide",
                &task,
                TaskUpdate {
                    hide_until: Some(until),
                    ..TaskUpdate::default()
                },
            )
        }
        TaskCommands::List { untagged, tag, all } => run_list(&ctx, untagged, tag, all),
    }
}

fn run_add(ctx: &Context, title: String, tags: &[String]) -> Result<()> {
    let title = title.trim().to_string();
    if title.is_empty() {
        return Err(Error::InvalidArgument("task title cannot be empty".to_string()));
    }

    let _lock = ctx.lock_commands()?;
    let task = ctx
        .service
        .store()
        .insert_task(TaskRecord::new(Ulid::new().to_string(), title))?;

    let desired: HashSet<String> = clean_names(tags).into_iter().collect();
    if !desired.is_empty() {
        ctx.service.synchronize(&task, &desired)?;
    }
    let tags: Vec<String> = ctx
        .service
        .tags_for_task(&task)?
        .into_iter()
        .map(|tag| tag.name)
        .collect();

    let mut human = HumanOutput::new(format!("tagsync task add: {}", task.id));
    human.push_summary("uuid", task.uuid.clone());
    human.push_summary("title", task.title.clone());
    if !tags.is_empty() {
        human.push_summary("tags", tags.join(", "));
    }

    emit_success(ctx.output, "task add", &TaskReport { task, tags }, Some(&human))
}

fn run_update(ctx: &Context, command: &str, key: &str, update: TaskUpdate) -> Result<()> {
    let _lock = ctx.lock_commands()?;
    let task = ctx.find_task(key)?;
    ctx.service
        .store()
        .update_tasks(&TaskCriterion::Id(task.id), &update)?;
    let task = ctx.find_task(&task.id.to_string())?;

    let mut human = HumanOutput::new(format!("tagsync {command}: {}", task.id));
    human.push_summary("title", task.title.clone());

    emit_success(
        ctx.output,
        command,
        &TaskReport {
            task,
            tags: Vec::new(),
        },
        Some(&human),
    )
}

fn run_list(ctx: &Context, untagged: bool, tag: Option<String>, all: bool) -> Result<()> {
    let base = if all {
        TaskCriterion::All
    } else {
        TaskCriterion::active_visible()
    };
    let criterion = match (untagged, tag) {
        (true, _) => untagged_criterion(),
        (false, Some(name)) => tasks_with_tag(&ctx.find_tag(&name)?, base),
        (false, None) => base,
    };
    let tasks = ctx.service.tasks_matching(&criterion)?;

    let mut human = HumanOutput::new(format!("tagsync task list: {} task(s)", tasks.len()));
    for task in &tasks {
        human.push_detail(format!("{} {}", task.id, task.title));
    }

    emit_success(ctx.output, "task list", &TaskListReport { tasks }, Some(&human))
}
