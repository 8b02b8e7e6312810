//! The board store: sole owner of projects, columns and tasks.
//!
//! Every mutation goes through [`Board`], which keeps the dense-order
//! invariants, applies cascade rules and writes all three collections back to
//! the key-value store afterwards. Storage failures are logged and swallowed;
//! the in-memory collections stay authoritative for the session.

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::drag::{DragItem, DragKind, DragSession};
use crate::error::{BoardError, Result};
use crate::ordering;
use crate::storage::{COLUMNS_KEY, KeyValueStore, PROJECTS_KEY, TASKS_KEY};
use crate::types::{
    Column, ColumnId, Project, ProjectDraft, ProjectId, Task, TaskDraft, TaskId, TaskPatch,
};

pub const DEFAULT_COLUMNS: [&str; 4] = ["Backlog", "To Do", "In Progress", "Done"];

/// Produces unique opaque identifiers.
pub trait IdGenerator {
    fn next_id(&self) -> String;
}

/// Supplies string-sortable timestamps.
pub trait Clock {
    fn now(&self) -> String;
}

/// Yes/no gate consulted before destructive operations.
pub trait Confirmation {
    fn confirm(&self, message: &str) -> bool;
}

impl<F> Confirmation for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Confirms everything; used when prompts are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl Confirmation for AlwaysConfirm {
    fn confirm(&self, _message: &str) -> bool {
        true
    }
}

/// Change counters, one per collection. Bumped on every committed mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Revisions {
    pub projects: u64,
    pub columns: u64,
    pub tasks: u64,
}

pub struct Board {
    projects: Vec<Project>,
    columns: Vec<Column>,
    tasks: Vec<Task>,
    storage: Box<dyn KeyValueStore>,
    ids: Box<dyn IdGenerator>,
    clock: Box<dyn Clock>,
    default_columns: Vec<String>,
    drag: DragSession,
    revisions: Revisions,
}

impl Board {
    /// Loads the three collections from `storage`, repairing any order gaps.
    pub fn load(storage: Box<dyn KeyValueStore>) -> Self {
        let projects: Vec<Project> = load_collection(storage.as_ref(), PROJECTS_KEY);
        let mut columns: Vec<Column> = load_collection(storage.as_ref(), COLUMNS_KEY);
        let mut tasks: Vec<Task> = load_collection(storage.as_ref(), TASKS_KEY);

        let mut repaired = false;
        for project in &projects {
            if !ordering::is_dense_project(&columns, &project.id) {
                warn!(project = %project.id, "stored column order has gaps; reindexing");
                ordering::reindex_project_columns(&mut columns, &project.id);
                repaired = true;
            }
        }
        let gapped = columns
            .iter()
            .filter(|column| !ordering::is_dense_column(&tasks, &column.id))
            .count();
        if gapped > 0 {
            warn!(columns = gapped, "stored task order has gaps; reindexing");
            ordering::reindex_all(&mut tasks);
            repaired = true;
        }

        info!(
            projects = projects.len(),
            columns = columns.len(),
            tasks = tasks.len(),
            "board loaded"
        );

        let mut board = Self {
            projects,
            columns,
            tasks,
            storage,
            ids: Box::new(UuidIds),
            clock: Box::new(SystemClock),
            default_columns: DEFAULT_COLUMNS.iter().map(|name| name.to_string()).collect(),
            drag: DragSession::new(),
            revisions: Revisions::default(),
        };
        if repaired {
            board.persist();
        }
        board
    }

    pub fn with_ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Column names seeded into every new project.
    pub fn with_default_columns(mut self, names: Vec<String>) -> Self {
        self.default_columns = names;
        self
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn revisions(&self) -> Revisions {
        self.revisions
    }

    pub fn project(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.iter().find(|project| &project.id == id)
    }

    pub fn column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|column| &column.id == id)
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    pub fn create_project(&mut self, draft: ProjectDraft) -> Result<Project> {
        self.ensure_idle()?;
        let name = required("name", &draft.name)?;
        let now = self.clock.now();
        let project = Project {
            id: ProjectId::new(self.ids.next_id()),
            name,
            description: draft.description.trim().to_string(),
            created_at: now.clone(),
            updated_at: now,
        };

        let seeded: Vec<Column> = self
            .default_columns
            .iter()
            .enumerate()
            .map(|(order, name)| Column {
                id: ColumnId::new(self.ids.next_id()),
                project_id: project.id.clone(),
                name: name.clone(),
                order,
            })
            .collect();

        info!(project = %project.id, name = %project.name, columns = seeded.len(), "created project");
        self.projects.push(project.clone());
        self.columns.extend(seeded);
        self.revisions.projects += 1;
        self.revisions.columns += 1;
        self.persist();
        Ok(project)
    }

    pub fn update_project(&mut self, id: &ProjectId, draft: ProjectDraft) -> Result<Project> {
        self.ensure_idle()?;
        let name = required("name", &draft.name)?;
        let now = self.clock.now();
        let project = self
            .projects
            .iter_mut()
            .find(|project| &project.id == id)
            .ok_or_else(|| BoardError::ProjectNotFound { id: id.clone() })?;

        project.name = name;
        project.description = draft.description.trim().to_string();
        project.updated_at = now;
        let updated = project.clone();

        self.revisions.projects += 1;
        self.persist();
        Ok(updated)
    }

    /// Removes the project with all of its columns and tasks.
    pub fn delete_project(&mut self, id: &ProjectId, confirm: &dyn Confirmation) -> Result<()> {
        self.ensure_idle()?;
        if self.project(id).is_none() {
            return Err(BoardError::ProjectNotFound { id: id.clone() });
        }
        if !confirm.confirm("Are you sure? This will delete all tasks in this project.") {
            return Err(BoardError::Cancelled);
        }

        self.projects.retain(|project| &project.id != id);
        let columns_before = self.columns.len();
        self.columns.retain(|column| &column.project_id != id);
        let tasks_before = self.tasks.len();
        self.tasks.retain(|task| &task.project_id != id);

        info!(
            project = %id,
            columns = columns_before - self.columns.len(),
            tasks = tasks_before - self.tasks.len(),
            "deleted project"
        );
        self.revisions.projects += 1;
        self.revisions.columns += 1;
        self.revisions.tasks += 1;
        self.persist();
        Ok(())
    }

    /// Appends a column to the right end of the project's board.
    pub fn add_column(&mut self, project_id: &ProjectId, name: &str) -> Result<Column> {
        self.ensure_idle()?;
        let name = required("name", name)?;
        if self.project(project_id).is_none() {
            return Err(BoardError::ProjectNotFound {
                id: project_id.clone(),
            });
        }

        let order = self
            .columns
            .iter()
            .filter(|column| &column.project_id == project_id)
            .count();
        let column = Column {
            id: ColumnId::new(self.ids.next_id()),
            project_id: project_id.clone(),
            name,
            order,
        };

        info!(column = %column.id, project = %project_id, "added column");
        self.columns.push(column.clone());
        self.revisions.columns += 1;
        self.persist();
        Ok(column)
    }

    pub fn rename_column(&mut self, id: &ColumnId, name: &str) -> Result<Column> {
        self.ensure_idle()?;
        let name = required("name", name)?;
        let column = self
            .columns
            .iter_mut()
            .find(|column| &column.id == id)
            .ok_or_else(|| BoardError::ColumnNotFound { id: id.clone() })?;
        column.name = name;
        let renamed = column.clone();

        self.revisions.columns += 1;
        self.persist();
        Ok(renamed)
    }

    /// Deletes an empty column. Columns that still hold tasks are refused.
    pub fn delete_column(&mut self, id: &ColumnId, confirm: &dyn Confirmation) -> Result<()> {
        self.ensure_idle()?;
        let project_id = self
            .column(id)
            .map(|column| column.project_id.clone())
            .ok_or_else(|| BoardError::ColumnNotFound { id: id.clone() })?;

        let count = self.tasks.iter().filter(|task| &task.column_id == id).count();
        if count > 0 {
            warn!(column = %id, count, "refusing to delete non-empty column");
            return Err(BoardError::ColumnNotEmpty {
                id: id.clone(),
                count,
            });
        }
        if !confirm.confirm("Delete this column?") {
            return Err(BoardError::Cancelled);
        }

        self.columns.retain(|column| &column.id != id);
        ordering::reindex_project_columns(&mut self.columns, &project_id);

        info!(column = %id, project = %project_id, "deleted column");
        self.revisions.columns += 1;
        self.persist();
        Ok(())
    }

    pub fn move_column(&mut self, id: &ColumnId, target_index: usize) -> Result<()> {
        self.ensure_idle()?;
        ordering::move_column(&mut self.columns, id, target_index)?;
        self.revisions.columns += 1;
        self.persist();
        Ok(())
    }

    /// Creates a task at the bottom of its column.
    pub fn add_task(&mut self, draft: TaskDraft) -> Result<Task> {
        self.ensure_idle()?;
        let title = required("title", &draft.title)?;
        let project_id = self
            .column(&draft.column_id)
            .map(|column| column.project_id.clone())
            .ok_or_else(|| BoardError::ColumnNotFound {
                id: draft.column_id.clone(),
            })?;

        let order = self
            .tasks
            .iter()
            .filter(|task| task.column_id == draft.column_id)
            .count();
        let now = self.clock.now();
        let task = Task {
            id: TaskId::new(self.ids.next_id()),
            project_id,
            column_id: draft.column_id,
            title,
            description: draft.description.trim().to_string(),
            priority: draft.priority,
            assignee: normalize_optional(draft.assignee),
            due_date: draft.due_date,
            order,
            created_at: now.clone(),
            updated_at: now,
        };

        info!(task = %task.id, column = %task.column_id, "added task");
        self.tasks.push(task.clone());
        self.revisions.tasks += 1;
        self.persist();
        Ok(task)
    }

    /// Edits a task. Changing its column moves it to the bottom of the new column.
    pub fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> Result<Task> {
        self.ensure_idle()?;
        let title = patch
            .title
            .as_deref()
            .map(|title| required("title", title))
            .transpose()?;
        let current_column = self
            .task(id)
            .map(|task| task.column_id.clone())
            .ok_or_else(|| BoardError::TaskNotFound { id: id.clone() })?;

        if let Some(target) = patch.column_id.as_ref().filter(|target| **target != current_column)
        {
            let project_id = self
                .column(target)
                .map(|column| column.project_id.clone())
                .ok_or_else(|| BoardError::ColumnNotFound { id: target.clone() })?;
            ordering::move_task(&mut self.tasks, id, target, usize::MAX)?;
            if let Some(task) = self.tasks.iter_mut().find(|task| &task.id == id) {
                task.project_id = project_id;
            }
        }

        let now = self.clock.now();
        let task = self
            .tasks
            .iter_mut()
            .find(|task| &task.id == id)
            .ok_or_else(|| BoardError::TaskNotFound { id: id.clone() })?;
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description.trim().to_string();
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(assignee) = patch.assignee {
            task.assignee = normalize_optional(assignee);
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
        }
        task.updated_at = now;
        let updated = task.clone();

        self.revisions.tasks += 1;
        self.persist();
        Ok(updated)
    }

    pub fn delete_task(&mut self, id: &TaskId, confirm: &dyn Confirmation) -> Result<()> {
        self.ensure_idle()?;
        let column_id = self
            .task(id)
            .map(|task| task.column_id.clone())
            .ok_or_else(|| BoardError::TaskNotFound { id: id.clone() })?;
        if !confirm.confirm("Delete this task?") {
            return Err(BoardError::Cancelled);
        }

        self.tasks.retain(|task| &task.id != id);
        ordering::reindex_column(&mut self.tasks, &column_id);

        info!(task = %id, column = %column_id, "deleted task");
        self.revisions.tasks += 1;
        self.persist();
        Ok(())
    }

    /// Moves a task to `target_index` of `target_column_id` (index clamped).
    pub fn move_task(
        &mut self,
        id: &TaskId,
        target_column_id: &ColumnId,
        target_index: usize,
    ) -> Result<()> {
        self.ensure_idle()?;
        let project_id = self
            .column(target_column_id)
            .map(|column| column.project_id.clone())
            .ok_or_else(|| BoardError::ColumnNotFound {
                id: target_column_id.clone(),
            })?;
        let before = self
            .task(id)
            .map(|task| (task.column_id.clone(), task.order))
            .ok_or_else(|| BoardError::TaskNotFound { id: id.clone() })?;

        ordering::move_task(&mut self.tasks, id, target_column_id, target_index)?;
        ordering::reindex_column(&mut self.tasks, &before.0);
        ordering::reindex_column(&mut self.tasks, target_column_id);

        let now = self.clock.now();
        if let Some(task) = self.tasks.iter_mut().find(|task| &task.id == id)
            && (task.column_id != before.0 || task.order != before.1)
        {
            task.project_id = project_id;
            task.updated_at = now;
        }

        self.revisions.tasks += 1;
        self.persist();
        Ok(())
    }

    /// Normalizes `column_id` to dense `0..n-1` orders and persists.
    pub fn reindex_column(&mut self, column_id: &ColumnId) -> Result<()> {
        self.ensure_idle()?;
        if self.column(column_id).is_none() {
            return Err(BoardError::ColumnNotFound {
                id: column_id.clone(),
            });
        }
        ordering::reindex_column(&mut self.tasks, column_id);
        self.revisions.tasks += 1;
        self.persist();
        Ok(())
    }

    pub fn drag_session(&self) -> &DragSession {
        &self.drag
    }

    /// Tasks as they should currently be displayed, provisional mid-gesture.
    pub fn visible_tasks(&self) -> &[Task] {
        self.drag.provisional_tasks().unwrap_or(&self.tasks)
    }

    pub fn visible_columns(&self) -> &[Column] {
        self.drag.provisional_columns().unwrap_or(&self.columns)
    }

    pub fn begin_drag(&mut self, item_id: &str) -> Result<DragKind> {
        self.drag.start(item_id, &self.tasks, &self.columns)
    }

    pub fn drag_over(&mut self, over_id: &str) -> Result<bool> {
        self.drag.hover(over_id)
    }

    /// Ends the gesture. Returns whether anything was committed.
    pub fn finish_drag(&mut self, over_id: Option<&str>) -> Result<bool> {
        let Some(outcome) = self.drag.finish(over_id)? else {
            return Ok(false);
        };

        match &outcome.item {
            DragItem::Task(id) => {
                let slot = |task: &Task| (task.column_id.clone(), task.order);
                let before = self.task(id).map(slot);
                let mut tasks = outcome.tasks;
                let landed = tasks.iter().find(|task| &task.id == id).map(slot);
                if before != landed {
                    let now = self.clock.now();
                    if let Some(task) = tasks.iter_mut().find(|task| &task.id == id) {
                        task.updated_at = now;
                    }
                }
                self.tasks = tasks;
                self.revisions.tasks += 1;
            }
            DragItem::Column(_) => {
                self.columns = outcome.columns;
                self.revisions.columns += 1;
            }
        }

        debug!(item = outcome.item.id(), "committed drag");
        self.persist();
        Ok(true)
    }

    pub fn cancel_drag(&mut self) -> Result<()> {
        self.drag.cancel()
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.drag.is_dragging() {
            return Err(BoardError::DragInProgress);
        }
        Ok(())
    }

    /// Writes all three collections; a failed write is logged, never returned.
    fn persist(&mut self) {
        let records = [
            (PROJECTS_KEY, serde_json::to_string(&self.projects)),
            (COLUMNS_KEY, serde_json::to_string(&self.columns)),
            (TASKS_KEY, serde_json::to_string(&self.tasks)),
        ];
        for (key, encoded) in records {
            let result = encoded
                .map_err(anyhow::Error::from)
                .and_then(|value| self.storage.set(key, &value));
            if let Err(err) = result {
                error!(key, error = %format!("{err:#}"), "failed to persist board state");
            }
        }
    }
}

fn load_collection<T: DeserializeOwned>(
    storage: &dyn KeyValueStore,
    key: &str,
) -> Vec<T> {
    match storage.get(key) {
        Ok(Some(raw)) => match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
            Ok(records) => records
                .into_iter()
                .enumerate()
                .filter_map(|(index, record)| match serde_json::from_value::<T>(record) {
                    Ok(item) => Some(item),
                    Err(err) => {
                        warn!(key, index, error = %err, "skipping unreadable stored record");
                        None
                    }
                })
                .collect(),
            Err(err) => {
                warn!(key, error = %err, "failed to parse stored collection; starting empty");
                Vec::new()
            }
        },
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!(key, error = %format!("{err:#}"), "failed to read stored collection; starting empty");
            Vec::new()
        }
    }
}

fn required(field: &'static str, raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BoardError::validation(field, "cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}
