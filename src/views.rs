//! Derived projections over the board collections.
//!
//! The free functions are pure. [`BoardViews`] caches their results against
//! the board's revision counters and recomputes only when an input changed.

use std::collections::HashMap;

use serde::Serialize;

use crate::board::Board;
use crate::types::{Column, ColumnId, Project, ProjectId, Task};

/// Name a column must carry (case-insensitively) for its tasks to count as done.
pub const DONE_COLUMN: &str = "done";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

/// Every column's tasks, ascending by `order`. Empty columns map to empty lists.
pub fn tasks_by_column(tasks: &[Task], columns: &[Column]) -> HashMap<ColumnId, Vec<Task>> {
    let mut grouped: HashMap<ColumnId, Vec<Task>> = columns
        .iter()
        .map(|column| (column.id.clone(), Vec::new()))
        .collect();
    for task in tasks {
        if let Some(bucket) = grouped.get_mut(&task.column_id) {
            bucket.push(task.clone());
        }
    }
    for bucket in grouped.values_mut() {
        bucket.sort_by_key(|task| task.order);
    }
    grouped
}

pub fn columns_by_project(columns: &[Column], project_id: &ProjectId) -> Vec<Column> {
    let mut matching: Vec<Column> = columns
        .iter()
        .filter(|column| &column.project_id == project_id)
        .cloned()
        .collect();
    matching.sort_by_key(|column| column.order);
    matching
}

pub fn project_progress(project: &Project, tasks: &[Task], columns: &[Column]) -> Progress {
    let done_columns: Vec<&ColumnId> = columns
        .iter()
        .filter(|column| column.name.eq_ignore_ascii_case(DONE_COLUMN))
        .map(|column| &column.id)
        .collect();

    let project_tasks = tasks.iter().filter(|task| task.project_id == project.id);
    let (completed, total) = project_tasks.fold((0, 0), |(completed, total), task| {
        let done = done_columns.contains(&&task.column_id);
        (completed + usize::from(done), total + 1)
    });

    let percent = if total == 0 {
        0
    } else {
        (completed as f64 / total as f64 * 100.0).round() as u8
    };
    Progress {
        completed,
        total,
        percent,
    }
}

#[derive(Debug, Clone)]
struct Memo<K, V> {
    key: K,
    value: V,
}

/// Caches projections keyed by the revisions they were computed from.
#[derive(Debug, Default)]
pub struct BoardViews {
    tasks_by_column: Option<Memo<(u64, u64), HashMap<ColumnId, Vec<Task>>>>,
    columns_by_project: HashMap<ProjectId, Memo<u64, Vec<Column>>>,
    progress: HashMap<ProjectId, Memo<(u64, u64, u64), Progress>>,
    computations: usize,
}

impl BoardViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many projections have actually been computed (cache misses).
    pub fn computations(&self) -> usize {
        self.computations
    }

    pub fn tasks_by_column(&mut self, board: &Board) -> &HashMap<ColumnId, Vec<Task>> {
        let revisions = board.revisions();
        let key = (revisions.tasks, revisions.columns);
        if self
            .tasks_by_column
            .as_ref()
            .is_some_and(|memo| memo.key != key)
        {
            self.tasks_by_column = None;
        }
        let computations = &mut self.computations;
        &self
            .tasks_by_column
            .get_or_insert_with(|| {
                *computations += 1;
                Memo {
                    key,
                    value: tasks_by_column(board.tasks(), board.columns()),
                }
            })
            .value
    }

    pub fn columns_by_project(&mut self, board: &Board, project_id: &ProjectId) -> &[Column] {
        let key = board.revisions().columns;
        let stale = self
            .columns_by_project
            .get(project_id)
            .is_none_or(|memo| memo.key != key);
        if stale {
            self.computations += 1;
            self.columns_by_project.insert(
                project_id.clone(),
                Memo {
                    key,
                    value: columns_by_project(board.columns(), project_id),
                },
            );
        }
        self.columns_by_project
            .get(project_id)
            .map(|memo| memo.value.as_slice())
            .unwrap_or_default()
    }

    /// `None` when the project no longer exists.
    pub fn project_progress(&mut self, board: &Board, project_id: &ProjectId) -> Option<Progress> {
        let project = board.project(project_id)?;
        let revisions = board.revisions();
        let key = (revisions.projects, revisions.columns, revisions.tasks);
        if let Some(memo) = self.progress.get(project_id)
            && memo.key == key
        {
            return Some(memo.value);
        }

        self.computations += 1;
        let value = project_progress(project, board.tasks(), board.columns());
        self.progress
            .insert(project_id.clone(), Memo { key, value });
        Some(value)
    }
}
