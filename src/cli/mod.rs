use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::error;

use crate::{
    board::{Board, Confirmation},
    error::BoardError,
    settings::Settings,
    types::{
        Column, ColumnId, Priority, ProjectDraft, ProjectId, Task, TaskDraft, TaskId, TaskPatch,
    },
    views::{self, BoardViews},
};

const SCHEMA_VERSION: &str = "cli.v1";
const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone, Subcommand)]
pub enum RootCommand {
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    Column {
        #[command(subcommand)]
        command: ColumnCommand,
    },
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Replay a drag gesture: start on --item, hover each --over, drop on the last one.
    Drag(DragArgs),
    /// Show or change settings.toml.
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum SettingsCommand {
    Show,
    Set(SettingsSetArgs),
}

#[derive(Debug, Clone, Subcommand)]
pub enum ProjectCommand {
    List,
    Create(ProjectCreateArgs),
    Update(ProjectUpdateArgs),
    Delete(IdArgs),
    /// Render a project's board.
    Show(IdArgs),
}

#[derive(Debug, Clone, Subcommand)]
pub enum ColumnCommand {
    Add(ColumnAddArgs),
    Rename(ColumnRenameArgs),
    Move(ColumnMoveArgs),
    Delete(IdArgs),
}

#[derive(Debug, Clone, Subcommand)]
pub enum TaskCommand {
    List(TaskListArgs),
    Add(TaskAddArgs),
    Update(TaskUpdateArgs),
    Move(TaskMoveArgs),
    Delete(IdArgs),
}

#[derive(Debug, Clone, Args)]
pub struct IdArgs {
    #[arg(long, value_name = "ID")]
    pub id: String,
}

#[derive(Debug, Clone, Args)]
pub struct ProjectCreateArgs {
    #[arg(long, value_name = "TEXT")]
    pub name: String,

    #[arg(long, value_name = "TEXT", default_value = "")]
    pub description: String,
}

#[derive(Debug, Clone, Args)]
pub struct ProjectUpdateArgs {
    #[arg(long, value_name = "ID")]
    pub id: String,

    #[arg(long, value_name = "TEXT")]
    pub name: Option<String>,

    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ColumnAddArgs {
    #[arg(long, value_name = "PROJECT_ID")]
    pub project: String,

    #[arg(long, value_name = "TEXT")]
    pub name: String,
}

#[derive(Debug, Clone, Args)]
pub struct ColumnRenameArgs {
    #[arg(long, value_name = "ID")]
    pub id: String,

    #[arg(long, value_name = "TEXT")]
    pub name: String,
}

#[derive(Debug, Clone, Args)]
pub struct ColumnMoveArgs {
    #[arg(long, value_name = "ID")]
    pub id: String,

    #[arg(long, value_name = "N")]
    pub index: usize,
}

#[derive(Debug, Clone, Args)]
pub struct TaskListArgs {
    #[arg(long, value_name = "PROJECT_ID")]
    pub project: String,

    #[arg(long, value_name = "COLUMN_ID")]
    pub column: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct TaskAddArgs {
    #[arg(long, value_name = "COLUMN_ID")]
    pub column: String,

    #[arg(long, value_name = "TEXT")]
    pub title: String,

    #[arg(long, value_name = "TEXT", default_value = "")]
    pub description: String,

    #[arg(long, value_name = "LOW|MEDIUM|HIGH")]
    pub priority: Option<Priority>,

    #[arg(long, value_name = "NAME")]
    pub assignee: Option<String>,

    #[arg(long, value_name = "YYYY-MM-DD")]
    pub due: Option<NaiveDate>,
}

#[derive(Debug, Clone, Args)]
pub struct TaskUpdateArgs {
    #[arg(long, value_name = "ID")]
    pub id: String,

    #[arg(long, value_name = "TEXT")]
    pub title: Option<String>,

    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,

    #[arg(long, value_name = "LOW|MEDIUM|HIGH")]
    pub priority: Option<Priority>,

    /// Empty string clears the assignee.
    #[arg(long, value_name = "NAME")]
    pub assignee: Option<String>,

    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "clear_due")]
    pub due: Option<NaiveDate>,

    #[arg(long)]
    pub clear_due: bool,

    #[arg(long, value_name = "COLUMN_ID")]
    pub column: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct TaskMoveArgs {
    #[arg(long, value_name = "ID")]
    pub id: String,

    #[arg(long, value_name = "COLUMN_ID")]
    pub column: String,

    /// Zero-based slot in the target column; defaults to the bottom.
    #[arg(long, value_name = "N")]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct DragArgs {
    #[arg(long, value_name = "ID")]
    pub item: String,

    #[arg(long, value_name = "ID")]
    pub over: Vec<String>,

    /// Abandon the gesture instead of dropping.
    #[arg(long)]
    pub cancel: bool,
}

#[derive(Debug, Clone, Args)]
pub struct SettingsSetArgs {
    /// Directory boards are stored in.
    #[arg(long = "storage-dir", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Comma-separated column names seeded into new projects.
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub default_columns: Option<Vec<String>>,

    #[arg(long, value_name = "BOOL")]
    pub confirm_deletes: Option<bool>,
}

/// Asks on stderr and reads the answer from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

impl Confirmation for StdinConfirm {
    fn confirm(&self, message: &str) -> bool {
        eprint!("{message} [y/N] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

pub fn run(
    board: &mut Board,
    command: RootCommand,
    confirm: &dyn Confirmation,
    json_output: bool,
    quiet: bool,
) -> i32 {
    report(execute(board, command, confirm), json_output, quiet)
}

/// Runs a settings command without opening the board.
pub fn run_settings(command: SettingsCommand, json_output: bool, quiet: bool) -> i32 {
    let path = Settings::config_path();
    report(
        execute_settings_command(command, path.as_deref()),
        json_output,
        quiet,
    )
}

fn report(result: CliResult<CommandOutput>, json_output: bool, quiet: bool) -> i32 {
    match result {
        Ok(output) => {
            print_success(output, json_output, quiet);
            0
        }
        Err(err) => {
            print_error(&err, json_output);
            err.exit_code
        }
    }
}

#[derive(Debug)]
struct CommandOutput {
    command: &'static str,
    data: Value,
    text: String,
}

#[derive(Debug)]
struct CliError {
    exit_code: i32,
    code: &'static str,
    message: String,
    details: Option<Value>,
}

type CliResult<T> = Result<T, CliError>;

fn execute(
    board: &mut Board,
    command: RootCommand,
    confirm: &dyn Confirmation,
) -> CliResult<CommandOutput> {
    match command {
        RootCommand::Project { command } => execute_project_command(board, command, confirm),
        RootCommand::Column { command } => execute_column_command(board, command, confirm),
        RootCommand::Task { command } => execute_task_command(board, command, confirm),
        RootCommand::Drag(args) => drag(board, args),
        RootCommand::Settings { command } => {
            execute_settings_command(command, Settings::config_path().as_deref())
        }
    }
}

fn execute_settings_command(
    command: SettingsCommand,
    path: Option<&Path>,
) -> CliResult<CommandOutput> {
    let path = path.ok_or_else(|| runtime_error("unable to determine settings config path"))?;
    match command {
        SettingsCommand::Show => {
            settings_output("settings show", &Settings::load_from_path(path), path)
        }
        SettingsCommand::Set(args) => settings_set(args, path),
    }
}

fn execute_project_command(
    board: &mut Board,
    command: ProjectCommand,
    confirm: &dyn Confirmation,
) -> CliResult<CommandOutput> {
    match command {
        ProjectCommand::List => project_list(board),
        ProjectCommand::Create(args) => project_create(board, args),
        ProjectCommand::Update(args) => project_update(board, args),
        ProjectCommand::Delete(args) => project_delete(board, args, confirm),
        ProjectCommand::Show(args) => project_show(board, args),
    }
}

fn execute_column_command(
    board: &mut Board,
    command: ColumnCommand,
    confirm: &dyn Confirmation,
) -> CliResult<CommandOutput> {
    match command {
        ColumnCommand::Add(args) => column_add(board, args),
        ColumnCommand::Rename(args) => column_rename(board, args),
        ColumnCommand::Move(args) => column_move(board, args),
        ColumnCommand::Delete(args) => column_delete(board, args, confirm),
    }
}

fn execute_task_command(
    board: &mut Board,
    command: TaskCommand,
    confirm: &dyn Confirmation,
) -> CliResult<CommandOutput> {
    match command {
        TaskCommand::List(args) => task_list(board, args),
        TaskCommand::Add(args) => task_add(board, args),
        TaskCommand::Update(args) => task_update(board, args),
        TaskCommand::Move(args) => task_move(board, args),
        TaskCommand::Delete(args) => task_delete(board, args, confirm),
    }
}

fn project_list(board: &Board) -> CliResult<CommandOutput> {
    let mut views = BoardViews::new();
    let mut entries = Vec::new();
    let mut rows = Vec::new();
    for project in board.projects() {
        let progress = views
            .project_progress(board, &project.id)
            .unwrap_or_default();
        rows.push(vec![
            short_id(project.id.as_str()),
            single_line(&project.name),
            format!("{}/{}", progress.completed, progress.total),
            format!("{}%", progress.percent),
            project.updated_at.clone(),
        ]);
        entries.push(json!({
            "project": to_json(project)?,
            "progress": to_json(&progress)?,
        }));
    }

    let text = if rows.is_empty() {
        "No projects yet.".to_string()
    } else {
        render_text_table(&["ID", "Name", "Done", "Progress", "Updated"], &rows)
    };
    Ok(CommandOutput {
        command: "project list",
        data: json!({ "projects": entries }),
        text,
    })
}

fn project_create(board: &mut Board, args: ProjectCreateArgs) -> CliResult<CommandOutput> {
    let project = board
        .create_project(ProjectDraft {
            name: args.name,
            description: args.description,
        })
        .map_err(board_error)?;
    let columns = views::columns_by_project(board.columns(), &project.id);

    Ok(CommandOutput {
        command: "project create",
        data: json!({ "project": to_json(&project)?, "columns": to_json(&columns)? }),
        text: format!("created project {} ({})", project.name, project.id),
    })
}

fn project_update(board: &mut Board, args: ProjectUpdateArgs) -> CliResult<CommandOutput> {
    let id = resolve_project_id(board, &args.id)?;
    let current = board
        .project(&id)
        .cloned()
        .ok_or_else(|| board_error(BoardError::ProjectNotFound { id: id.clone() }))?;
    if args.name.is_none() && args.description.is_none() {
        return Err(usage_error(
            "NOTHING_TO_UPDATE",
            "pass --name and/or --description",
        ));
    }

    let project = board
        .update_project(
            &id,
            ProjectDraft {
                name: args.name.unwrap_or(current.name),
                description: args.description.unwrap_or(current.description),
            },
        )
        .map_err(board_error)?;

    Ok(CommandOutput {
        command: "project update",
        data: json!({ "project": to_json(&project)? }),
        text: format!("updated project {}", project.id),
    })
}

fn project_delete(
    board: &mut Board,
    args: IdArgs,
    confirm: &dyn Confirmation,
) -> CliResult<CommandOutput> {
    let id = resolve_project_id(board, &args.id)?;
    match board.delete_project(&id, confirm) {
        Ok(()) => Ok(CommandOutput {
            command: "project delete",
            data: json!({ "deleted": id }),
            text: format!("deleted project {id}"),
        }),
        Err(BoardError::Cancelled) => Ok(cancelled_output("project delete")),
        Err(err) => Err(board_error(err)),
    }
}

fn project_show(board: &Board, args: IdArgs) -> CliResult<CommandOutput> {
    let id = resolve_project_id(board, &args.id)?;
    let Some(project) = board.project(&id) else {
        return Err(not_found_error(
            "PROJECT_NOT_FOUND",
            format!("project '{}' not found", args.id),
        ));
    };

    let mut views = BoardViews::new();
    let progress = views.project_progress(board, &id).unwrap_or_default();
    let columns = views.columns_by_project(board, &id).to_vec();
    let grouped = views.tasks_by_column(board);

    let mut rows = Vec::new();
    let mut column_entries = Vec::new();
    for column in &columns {
        let tasks = grouped.get(&column.id).map(Vec::as_slice).unwrap_or_default();
        if tasks.is_empty() {
            rows.push(vec![
                single_line(&column.name),
                "-".to_string(),
                String::new(),
                String::new(),
                String::new(),
            ]);
        }
        for task in tasks {
            rows.push(vec![
                single_line(&column.name),
                task.order.to_string(),
                short_id(task.id.as_str()),
                single_line(&task.title),
                task.priority.to_string(),
            ]);
        }
        column_entries.push(json!({
            "column": to_json(column)?,
            "tasks": to_json(&tasks)?,
        }));
    }

    let header = format!(
        "{} ({}/{} done, {}%)",
        project.name, progress.completed, progress.total, progress.percent
    );
    let table = render_text_table(&["Column", "#", "ID", "Title", "Priority"], &rows);
    Ok(CommandOutput {
        command: "project show",
        data: json!({
            "project": to_json(project)?,
            "progress": to_json(&progress)?,
            "columns": column_entries,
        }),
        text: format!("{header}\n{table}"),
    })
}

fn column_add(board: &mut Board, args: ColumnAddArgs) -> CliResult<CommandOutput> {
    let project_id = resolve_project_id(board, &args.project)?;
    let column = board
        .add_column(&project_id, &args.name)
        .map_err(board_error)?;
    Ok(CommandOutput {
        command: "column add",
        data: json!({ "column": to_json(&column)? }),
        text: format!("added column {} ({})", column.name, column.id),
    })
}

fn column_rename(board: &mut Board, args: ColumnRenameArgs) -> CliResult<CommandOutput> {
    let id = resolve_column_id(board, &args.id)?;
    let column = board.rename_column(&id, &args.name).map_err(board_error)?;
    Ok(CommandOutput {
        command: "column rename",
        data: json!({ "column": to_json(&column)? }),
        text: format!("renamed column {} to {}", column.id, column.name),
    })
}

fn column_move(board: &mut Board, args: ColumnMoveArgs) -> CliResult<CommandOutput> {
    let id = resolve_column_id(board, &args.id)?;
    board.move_column(&id, args.index).map_err(board_error)?;
    let column = lookup_column(board, &id)?;
    Ok(CommandOutput {
        command: "column move",
        data: json!({ "column": to_json(&column)? }),
        text: format!("moved column {} to position {}", column.name, column.order),
    })
}

fn column_delete(
    board: &mut Board,
    args: IdArgs,
    confirm: &dyn Confirmation,
) -> CliResult<CommandOutput> {
    let id = resolve_column_id(board, &args.id)?;
    match board.delete_column(&id, confirm) {
        Ok(()) => Ok(CommandOutput {
            command: "column delete",
            data: json!({ "deleted": id }),
            text: format!("deleted column {id}"),
        }),
        Err(BoardError::Cancelled) => Ok(cancelled_output("column delete")),
        Err(err) => Err(board_error(err)),
    }
}

fn task_list(board: &Board, args: TaskListArgs) -> CliResult<CommandOutput> {
    let project_id = resolve_project_id(board, &args.project)?;
    let column_filter = args
        .column
        .as_deref()
        .map(|selector| resolve_column_id(board, selector))
        .transpose()?;

    let columns = views::columns_by_project(board.columns(), &project_id);
    let grouped = views::tasks_by_column(board.tasks(), &columns);
    let mut listed: Vec<(&Column, &Task)> = Vec::new();
    for column in &columns {
        if column_filter.as_ref().is_some_and(|filter| filter != &column.id) {
            continue;
        }
        if let Some(tasks) = grouped.get(&column.id) {
            listed.extend(tasks.iter().map(|task| (column, task)));
        }
    }

    let text = if listed.is_empty() {
        "No tasks found.".to_string()
    } else {
        let rows = listed
            .iter()
            .map(|(column, task)| {
                vec![
                    short_id(task.id.as_str()),
                    single_line(&column.name),
                    task.order.to_string(),
                    task.priority.to_string(),
                    task.assignee.clone().unwrap_or_else(|| "-".to_string()),
                    task.due_date
                        .map(|due| due.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    single_line(&task.title),
                ]
            })
            .collect::<Vec<_>>();
        render_text_table(
            &["ID", "Column", "#", "Priority", "Assignee", "Due", "Title"],
            &rows,
        )
    };

    let tasks: Vec<&Task> = listed.iter().map(|(_, task)| *task).collect();
    Ok(CommandOutput {
        command: "task list",
        data: json!({ "tasks": to_json(&tasks)? }),
        text,
    })
}

fn task_add(board: &mut Board, args: TaskAddArgs) -> CliResult<CommandOutput> {
    let column_id = resolve_column_id(board, &args.column)?;
    let task = board
        .add_task(TaskDraft {
            column_id,
            title: args.title,
            description: args.description,
            priority: args.priority.unwrap_or_default(),
            assignee: args.assignee,
            due_date: args.due,
        })
        .map_err(board_error)?;
    Ok(CommandOutput {
        command: "task add",
        data: json!({ "task": to_json(&task)? }),
        text: format!("added task {} ({})", task.title, task.id),
    })
}

fn task_update(board: &mut Board, args: TaskUpdateArgs) -> CliResult<CommandOutput> {
    let id = resolve_task_id(board, &args.id)?;
    let column_id = args
        .column
        .as_deref()
        .map(|selector| resolve_column_id(board, selector))
        .transpose()?;
    let due_date = if args.clear_due {
        Some(None)
    } else {
        args.due.map(Some)
    };

    let task = board
        .update_task(
            &id,
            TaskPatch {
                title: args.title,
                description: args.description,
                priority: args.priority,
                assignee: args.assignee.map(Some),
                due_date,
                column_id,
            },
        )
        .map_err(board_error)?;
    Ok(CommandOutput {
        command: "task update",
        data: json!({ "task": to_json(&task)? }),
        text: format!("updated task {}", task.id),
    })
}

fn task_move(board: &mut Board, args: TaskMoveArgs) -> CliResult<CommandOutput> {
    let id = resolve_task_id(board, &args.id)?;
    let column_id = resolve_column_id(board, &args.column)?;
    board
        .move_task(&id, &column_id, args.index.unwrap_or(usize::MAX))
        .map_err(board_error)?;

    let task = board
        .task(&id)
        .cloned()
        .ok_or_else(|| board_error(BoardError::TaskNotFound { id: id.clone() }))?;
    Ok(CommandOutput {
        command: "task move",
        data: json!({ "task": to_json(&task)? }),
        text: format!(
            "moved task {} to {} at position {}",
            task.id, task.column_id, task.order
        ),
    })
}

fn task_delete(
    board: &mut Board,
    args: IdArgs,
    confirm: &dyn Confirmation,
) -> CliResult<CommandOutput> {
    let id = resolve_task_id(board, &args.id)?;
    match board.delete_task(&id, confirm) {
        Ok(()) => Ok(CommandOutput {
            command: "task delete",
            data: json!({ "deleted": id }),
            text: format!("deleted task {id}"),
        }),
        Err(BoardError::Cancelled) => Ok(cancelled_output("task delete")),
        Err(err) => Err(board_error(err)),
    }
}

fn drag(board: &mut Board, args: DragArgs) -> CliResult<CommandOutput> {
    let item = resolve_any_id(board, &args.item)?;
    let overs = args
        .over
        .iter()
        .map(|selector| resolve_any_id(board, selector))
        .collect::<CliResult<Vec<_>>>()?;

    let kind = board.begin_drag(&item).map_err(board_error)?;
    for over in &overs {
        board.drag_over(over).map_err(board_error)?;
    }

    let committed = if args.cancel {
        board.cancel_drag().map_err(board_error)?;
        false
    } else {
        board
            .finish_drag(overs.last().map(String::as_str))
            .map_err(board_error)?
    };

    let text = if committed {
        format!("dropped {item}")
    } else {
        format!("drag of {item} discarded; nothing changed")
    };
    Ok(CommandOutput {
        command: "drag",
        data: json!({
            "item": item,
            "kind": format!("{kind:?}"),
            "committed": committed,
        }),
        text,
    })
}

fn settings_set(args: SettingsSetArgs, path: &Path) -> CliResult<CommandOutput> {
    if args.data_dir.is_none() && args.default_columns.is_none() && args.confirm_deletes.is_none()
    {
        return Err(usage_error(
            "NOTHING_TO_UPDATE",
            "pass --storage-dir, --default-columns and/or --confirm-deletes",
        ));
    }

    let mut settings = Settings::load_from_path(path);
    if let Some(dir) = args.data_dir {
        settings.data_dir = Some(dir);
    }
    if let Some(columns) = args.default_columns {
        settings.default_columns = columns;
    }
    if let Some(confirm_deletes) = args.confirm_deletes {
        settings.confirm_deletes = confirm_deletes;
    }
    settings
        .save_to_path(path)
        .map_err(|err| runtime_error(format!("{err:#}")))?;

    settings_output("settings set", &Settings::load_from_path(path), path)
}

fn settings_output(
    command: &'static str,
    settings: &Settings,
    path: &Path,
) -> CliResult<CommandOutput> {
    let data_dir = settings.resolved_data_dir();
    let rows = vec![
        vec!["config".to_string(), path.display().to_string()],
        vec!["data_dir".to_string(), data_dir.display().to_string()],
        vec![
            "default_columns".to_string(),
            settings.default_columns.join(", "),
        ],
        vec![
            "confirm_deletes".to_string(),
            settings.confirm_deletes.to_string(),
        ],
    ];
    Ok(CommandOutput {
        command,
        data: json!({
            "path": path,
            "settings": to_json(settings)?,
            "resolved_data_dir": data_dir,
        }),
        text: render_text_table(&["Setting", "Value"], &rows),
    })
}

fn resolve_project_id(board: &Board, selector: &str) -> CliResult<ProjectId> {
    let ids = board.projects().iter().map(|project| project.id.as_str());
    resolve_id_selector(ids, selector, "project")
        .map(ProjectId::from)
        .map_err(|err| err.with_codes("PROJECT_NOT_FOUND"))
}

fn resolve_column_id(board: &Board, selector: &str) -> CliResult<ColumnId> {
    let ids = board.columns().iter().map(|column| column.id.as_str());
    resolve_id_selector(ids, selector, "column")
        .map(ColumnId::from)
        .map_err(|err| err.with_codes("COLUMN_NOT_FOUND"))
}

fn resolve_task_id(board: &Board, selector: &str) -> CliResult<TaskId> {
    let ids = board.tasks().iter().map(|task| task.id.as_str());
    resolve_id_selector(ids, selector, "task")
        .map(TaskId::from)
        .map_err(|err| err.with_codes("TASK_NOT_FOUND"))
}

/// Task or column id, for drag gestures.
fn resolve_any_id(board: &Board, selector: &str) -> CliResult<String> {
    let ids = board
        .tasks()
        .iter()
        .map(|task| task.id.as_str())
        .chain(board.columns().iter().map(|column| column.id.as_str()));
    resolve_id_selector(ids, selector, "task or column")
        .map_err(|err| err.with_codes("ITEM_NOT_FOUND"))
}

/// Exact id, else a unique prefix (the short ids printed in tables).
fn resolve_id_selector<'a>(
    ids: impl Iterator<Item = &'a str>,
    selector: &str,
    label: &str,
) -> CliResult<String> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(usage_error("EMPTY_ID", format!("{label} id cannot be empty")));
    }

    let mut matches = HashSet::new();
    for id in ids {
        if id == selector {
            return Ok(id.to_string());
        }
        if id.starts_with(selector) {
            matches.insert(id.to_string());
        }
    }

    match matches.len() {
        0 => Err(not_found_error(
            "NOT_FOUND",
            format!("{label} '{selector}' not found"),
        )),
        1 => Ok(matches.into_iter().next().unwrap_or_default()),
        _ => {
            let mut candidates: Vec<String> = matches.into_iter().collect();
            candidates.sort();
            Err(conflict_error(
                "AMBIGUOUS_ID",
                format!("{label} id prefix '{selector}' is ambiguous"),
                Some(json!({ "candidates": candidates })),
            ))
        }
    }
}

fn lookup_column(board: &Board, id: &ColumnId) -> CliResult<Column> {
    board
        .column(id)
        .cloned()
        .ok_or_else(|| board_error(BoardError::ColumnNotFound { id: id.clone() }))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> CliResult<Value> {
    serde_json::to_value(value).map_err(runtime_error)
}

fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

fn single_line(text: &str) -> String {
    text.replace('\n', " ")
}

fn cancelled_output(command: &'static str) -> CommandOutput {
    CommandOutput {
        command,
        data: json!({ "cancelled": true }),
        text: "cancelled".to_string(),
    }
}

fn render_text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            widths[index] = widths[index].max(cell.chars().count());
        }
    }

    let border = format!(
        "+{}+",
        widths
            .iter()
            .map(|width| "-".repeat(*width + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let render_row = |cells: Vec<&str>| {
        format!(
            "| {} |",
            cells
                .iter()
                .enumerate()
                .map(|(index, cell)| format!("{cell:<width$}", width = widths[index]))
                .collect::<Vec<_>>()
                .join(" | ")
        )
    };

    let mut lines = vec![border.clone(), render_row(headers.to_vec()), border.clone()];
    for row in rows {
        lines.push(render_row(row.iter().map(String::as_str).collect()));
    }
    lines.push(border);
    lines.join("\n")
}

impl CliError {
    /// Replaces the generic not-found code with an entity-specific one.
    fn with_codes(mut self, not_found: &'static str) -> Self {
        if self.code == "NOT_FOUND" {
            self.code = not_found;
        }
        self
    }
}

fn board_error(err: BoardError) -> CliError {
    let message = err.to_string();
    match err {
        BoardError::Validation { .. } => usage_error("VALIDATION_ERROR", message),
        BoardError::ProjectNotFound { .. } => not_found_error("PROJECT_NOT_FOUND", message),
        BoardError::ColumnNotFound { .. } => not_found_error("COLUMN_NOT_FOUND", message),
        BoardError::TaskNotFound { .. } => not_found_error("TASK_NOT_FOUND", message),
        BoardError::ColumnNotEmpty { id, count } => conflict_error(
            "COLUMN_NOT_EMPTY",
            message,
            Some(json!({ "column_id": id, "task_count": count })),
        ),
        BoardError::Cancelled => conflict_error("CANCELLED", message, None),
        BoardError::DragInProgress | BoardError::NoActiveDrag => {
            conflict_error("DRAG_STATE", message, None)
        }
        BoardError::InvalidDragItem { .. } => usage_error("INVALID_DRAG_ITEM", message),
    }
}

fn usage_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 2,
        code,
        message: message.into(),
        details: None,
    }
}

fn not_found_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 3,
        code,
        message: message.into(),
        details: None,
    }
}

fn conflict_error(
    code: &'static str,
    message: impl Into<String>,
    details: Option<Value>,
) -> CliError {
    CliError {
        exit_code: 4,
        code,
        message: message.into(),
        details,
    }
}

fn runtime_error(err: impl std::fmt::Display) -> CliError {
    CliError {
        exit_code: 5,
        code: "RUNTIME_ERROR",
        message: err.to_string(),
        details: None,
    }
}

fn print_success(output: CommandOutput, json_output: bool, quiet: bool) {
    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "command": output.command,
            "data": output.data
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => println!("{value}"),
            Err(_) => println!("{}", payload),
        }
        return;
    }

    if quiet {
        return;
    }

    if output.text.is_empty() {
        println!("ok");
    } else {
        println!("{}", output.text);
    }
}

fn print_error(err: &CliError, json_output: bool) {
    error!(
        code = err.code,
        message = %err.message,
        details = ?err.details,
        "cli command failed"
    );

    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "error": {
                "code": err.code,
                "message": err.message,
                "details": err.details
            }
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => eprintln!("{value}"),
            Err(_) => eprintln!("{}", payload),
        }
        return;
    }

    eprintln!("error[{}]: {}", err.code, err.message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::AlwaysConfirm;
    use crate::board::tests::test_board;
    use crate::storage::MemoryStore;
    use tempfile::TempDir;

    fn board_with_project() -> (Board, ProjectId) {
        let mut board = test_board(MemoryStore::new());
        let output = execute(
            &mut board,
            RootCommand::Project {
                command: ProjectCommand::Create(ProjectCreateArgs {
                    name: "Launch".to_string(),
                    description: "ship it".to_string(),
                }),
            },
            &AlwaysConfirm,
        )
        .expect("project should be created");
        let id = output.data["project"]["id"]
            .as_str()
            .expect("project id should be a string")
            .to_string();
        (board, ProjectId::from(id))
    }

    fn column_id(board: &Board, project: &ProjectId, name: &str) -> String {
        views::columns_by_project(board.columns(), project)
            .into_iter()
            .find(|column| column.name == name)
            .map(|column| column.id.to_string())
            .expect("column should exist")
    }

    fn add_task(board: &mut Board, column: &str, title: &str) -> String {
        let output = execute(
            board,
            RootCommand::Task {
                command: TaskCommand::Add(TaskAddArgs {
                    column: column.to_string(),
                    title: title.to_string(),
                    description: String::new(),
                    priority: Some(Priority::High),
                    assignee: None,
                    due: None,
                }),
            },
            &AlwaysConfirm,
        )
        .expect("task should be added");
        output.data["task"]["id"]
            .as_str()
            .expect("task id should be a string")
            .to_string()
    }

    #[test]
    fn project_create_returns_seeded_columns() {
        let (board, project) = board_with_project();
        assert_eq!(views::columns_by_project(board.columns(), &project).len(), 4);
    }

    #[test]
    fn id_selector_accepts_unique_prefix() {
        let ids = ["abc123", "abd456", "xyz"];
        let resolved = resolve_id_selector(ids.into_iter(), "abc", "task").expect("unique prefix");
        assert_eq!(resolved, "abc123");

        let exact = resolve_id_selector(ids.into_iter(), "xyz", "task").expect("exact id");
        assert_eq!(exact, "xyz");
    }

    #[test]
    fn id_selector_reports_ambiguity_and_absence() {
        let ids = ["abc123", "abd456"];
        let err = resolve_id_selector(ids.into_iter(), "ab", "task").expect_err("ambiguous");
        assert_eq!(err.exit_code, 4);
        assert_eq!(err.code, "AMBIGUOUS_ID");

        let err = resolve_id_selector(ids.into_iter(), "zz", "task")
            .expect_err("missing")
            .with_codes("TASK_NOT_FOUND");
        assert_eq!(err.exit_code, 3);
        assert_eq!(err.code, "TASK_NOT_FOUND");

        let err = resolve_id_selector(ids.into_iter(), "  ", "task").expect_err("empty");
        assert_eq!(err.exit_code, 2);
    }

    #[test]
    fn column_delete_with_tasks_is_a_conflict() {
        let (mut board, project) = board_with_project();
        let todo = column_id(&board, &project, "To Do");
        add_task(&mut board, &todo, "blocker");

        let err = execute(
            &mut board,
            RootCommand::Column {
                command: ColumnCommand::Delete(IdArgs { id: todo.clone() }),
            },
            &AlwaysConfirm,
        )
        .expect_err("non-empty column must not be deleted");

        assert_eq!(err.exit_code, 4);
        assert_eq!(err.code, "COLUMN_NOT_EMPTY");
        assert_eq!(err.details, Some(json!({ "column_id": todo, "task_count": 1 })));
    }

    #[test]
    fn declined_delete_reports_cancelled() {
        let (mut board, project) = board_with_project();
        let decline = |_: &str| false;

        let output = execute(
            &mut board,
            RootCommand::Project {
                command: ProjectCommand::Delete(IdArgs {
                    id: project.to_string(),
                }),
            },
            &decline,
        )
        .expect("declining is not an error");

        assert_eq!(output.text, "cancelled");
        assert!(board.project(&project).is_some());
    }

    #[test]
    fn task_move_defaults_to_bottom_of_column() {
        let (mut board, project) = board_with_project();
        let todo = column_id(&board, &project, "To Do");
        let done = column_id(&board, &project, "Done");
        add_task(&mut board, &done, "already done");
        let task = add_task(&mut board, &todo, "finish me");

        let output = execute(
            &mut board,
            RootCommand::Task {
                command: TaskCommand::Move(TaskMoveArgs {
                    id: short_id(&task),
                    column: done.clone(),
                    index: None,
                }),
            },
            &AlwaysConfirm,
        )
        .expect("move should succeed");

        assert_eq!(output.data["task"]["columnId"], json!(done));
        assert_eq!(output.data["task"]["order"], json!(1));
    }

    #[test]
    fn drag_command_commits_or_discards() {
        let (mut board, project) = board_with_project();
        let todo = column_id(&board, &project, "To Do");
        let doing = column_id(&board, &project, "In Progress");
        let task = add_task(&mut board, &todo, "drag me");

        let output = execute(
            &mut board,
            RootCommand::Drag(DragArgs {
                item: task.clone(),
                over: vec![doing.clone()],
                cancel: true,
            }),
            &AlwaysConfirm,
        )
        .expect("cancelled drag succeeds");
        assert_eq!(output.data["committed"], json!(false));
        assert_eq!(board.task(&TaskId::from(task.as_str())).unwrap().column_id.as_str(), todo);

        let output = execute(
            &mut board,
            RootCommand::Drag(DragArgs {
                item: task.clone(),
                over: vec![doing.clone()],
                cancel: false,
            }),
            &AlwaysConfirm,
        )
        .expect("drop succeeds");
        assert_eq!(output.data["committed"], json!(true));
        assert_eq!(output.data["kind"], json!("Task"));
        assert_eq!(board.task(&TaskId::from(task.as_str())).unwrap().column_id.as_str(), doing);
    }

    #[test]
    fn project_show_renders_progress_and_columns() {
        let (mut board, project) = board_with_project();
        let done = column_id(&board, &project, "Done");
        let todo = column_id(&board, &project, "To Do");
        add_task(&mut board, &done, "a");
        add_task(&mut board, &todo, "b");

        let output = execute(
            &mut board,
            RootCommand::Project {
                command: ProjectCommand::Show(IdArgs {
                    id: project.to_string(),
                }),
            },
            &AlwaysConfirm,
        )
        .expect("show should succeed");

        assert!(output.text.starts_with("Launch (1/2 done, 50%)"));
        assert_eq!(output.data["progress"]["percent"], json!(50));
        assert_eq!(output.data["columns"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn project_update_requires_a_field() {
        let (mut board, project) = board_with_project();
        let err = execute(
            &mut board,
            RootCommand::Project {
                command: ProjectCommand::Update(ProjectUpdateArgs {
                    id: project.to_string(),
                    name: None,
                    description: None,
                }),
            },
            &AlwaysConfirm,
        )
        .expect_err("empty update is a usage error");
        assert_eq!(err.exit_code, 2);
    }

    #[test]
    fn board_error_maps_validation_to_usage() {
        let err = board_error(BoardError::validation("title", "cannot be empty"));
        assert_eq!(err.exit_code, 2);
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[test]
    fn settings_set_saves_and_show_reads_back() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("agile-board").join("settings.toml");

        let output = execute_settings_command(
            SettingsCommand::Set(SettingsSetArgs {
                data_dir: Some(temp_dir.path().join("boards")),
                default_columns: Some(vec![" Ideas ".to_string(), "Shipped".to_string()]),
                confirm_deletes: Some(false),
            }),
            Some(&path),
        )
        .expect("settings should save");
        assert_eq!(output.command, "settings set");
        assert!(path.exists());

        let output = execute_settings_command(SettingsCommand::Show, Some(&path))
            .expect("settings should load");
        assert_eq!(
            output.data["settings"]["default_columns"],
            json!(["Ideas", "Shipped"])
        );
        assert_eq!(output.data["settings"]["confirm_deletes"], json!(false));
        assert_eq!(
            output.data["resolved_data_dir"],
            json!(temp_dir.path().join("boards"))
        );
    }

    #[test]
    fn settings_set_requires_a_field() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("settings.toml");
        let err = execute_settings_command(
            SettingsCommand::Set(SettingsSetArgs {
                data_dir: None,
                default_columns: None,
                confirm_deletes: None,
            }),
            Some(&path),
        )
        .expect_err("empty set is a usage error");
        assert_eq!(err.exit_code, 2);
        assert!(!path.exists());
    }

    #[test]
    fn render_text_table_pads_columns() {
        let table = render_text_table(
            &["ID", "Name"],
            &[vec!["1".to_string(), "Backlog".to_string()]],
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "+----+---------+");
        assert_eq!(lines[1], "| ID | Name    |");
        assert_eq!(lines[3], "| 1  | Backlog |");
    }
}
