//! Dense order maintenance for tasks within a column and columns within a project.
//!
//! Every operation here works in place on the full collection. A group's
//! "current sequence" is its members sorted by `order`, ties broken by array
//! position, so a reindex pass never invents a new relative order.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{BoardError, Result};
use crate::types::{Column, ColumnId, ProjectId, Task, TaskId};

/// Indices into `items` of the members of one group, in their current sequence.
fn group_sequence<T>(
    items: &[T],
    in_group: impl Fn(&T) -> bool,
    rank: impl Fn(&T) -> usize,
) -> Vec<usize> {
    let mut indices: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| in_group(item))
        .map(|(idx, _)| idx)
        .collect();
    indices.sort_by_key(|&idx| (rank(&items[idx]), idx));
    indices
}

fn column_sequence(tasks: &[Task], column_id: &ColumnId) -> Vec<usize> {
    group_sequence(tasks, |task| &task.column_id == column_id, |task| task.order)
}

fn project_sequence(columns: &[Column], project_id: &ProjectId) -> Vec<usize> {
    group_sequence(
        columns,
        |column| &column.project_id == project_id,
        |column| column.order,
    )
}

/// Moves `task_id` into `target_column_id` at `target_index`.
///
/// The index is clamped to `[0, len]` of the target column (after removal of
/// the task when the column is unchanged). Both the source and the target
/// column end up dense.
pub fn move_task(
    tasks: &mut [Task],
    task_id: &TaskId,
    target_column_id: &ColumnId,
    target_index: usize,
) -> Result<()> {
    let moved = tasks
        .iter()
        .position(|task| &task.id == task_id)
        .ok_or_else(|| BoardError::TaskNotFound {
            id: task_id.clone(),
        })?;
    let source_column_id = tasks[moved].column_id.clone();

    let mut source: Vec<usize> = column_sequence(tasks, &source_column_id);
    source.retain(|&idx| idx != moved);

    let mut target = if &source_column_id == target_column_id {
        std::mem::take(&mut source)
    } else {
        column_sequence(tasks, target_column_id)
    };
    let slot = target_index.min(target.len());
    target.insert(slot, moved);

    for (order, &idx) in source.iter().enumerate() {
        tasks[idx].order = order;
    }
    for (order, &idx) in target.iter().enumerate() {
        tasks[idx].order = order;
    }
    tasks[moved].column_id = target_column_id.clone();

    debug!(
        task = %task_id,
        from = %source_column_id,
        to = %target_column_id,
        index = slot,
        "moved task"
    );
    Ok(())
}

/// Reassigns `0..n-1` to the tasks of `column_id` in their current sequence.
pub fn reindex_column(tasks: &mut [Task], column_id: &ColumnId) {
    for (order, idx) in column_sequence(tasks, column_id).into_iter().enumerate() {
        tasks[idx].order = order;
    }
}

/// Runs [`reindex_column`] for every column referenced by `tasks`.
pub fn reindex_all(tasks: &mut [Task]) {
    let mut seen = HashSet::new();
    let column_ids: Vec<ColumnId> = tasks
        .iter()
        .filter(|task| seen.insert(task.column_id.clone()))
        .map(|task| task.column_id.clone())
        .collect();
    for column_id in &column_ids {
        reindex_column(tasks, column_id);
    }
}

/// Numbers every column's tasks by array position, ignoring stored `order`.
///
/// This is the end-of-gesture pass: provisional drag updates splice array
/// positions and leave `order` stale, so the array is the source of truth.
pub fn reindex_by_position(tasks: &mut [Task]) {
    let mut counters: std::collections::HashMap<ColumnId, usize> =
        std::collections::HashMap::new();
    for task in tasks.iter_mut() {
        let next = counters.entry(task.column_id.clone()).or_insert(0);
        task.order = *next;
        *next += 1;
    }
}

/// Stable-sorts `tasks` by `order`, so each column's array sequence matches
/// its order sequence.
pub fn arrange_by_order(tasks: &mut [Task]) {
    tasks.sort_by_key(|task| task.order);
}

/// Moves `column_id` to `target_index` among its project's columns.
pub fn move_column(
    columns: &mut [Column],
    column_id: &ColumnId,
    target_index: usize,
) -> Result<()> {
    let moved = columns
        .iter()
        .position(|column| &column.id == column_id)
        .ok_or_else(|| BoardError::ColumnNotFound {
            id: column_id.clone(),
        })?;
    let project_id = columns[moved].project_id.clone();

    let mut sequence = project_sequence(columns, &project_id);
    sequence.retain(|&idx| idx != moved);
    let slot = target_index.min(sequence.len());
    sequence.insert(slot, moved);

    for (order, &idx) in sequence.iter().enumerate() {
        columns[idx].order = order;
    }

    debug!(column = %column_id, project = %project_id, index = slot, "moved column");
    Ok(())
}

/// Reassigns `0..m-1` to the columns of `project_id` in their current sequence.
pub fn reindex_project_columns(columns: &mut [Column], project_id: &ProjectId) {
    for (order, idx) in project_sequence(columns, project_id)
        .into_iter()
        .enumerate()
    {
        columns[idx].order = order;
    }
}

/// Whether the tasks of `column_id` carry exactly the orders `0..n-1`.
pub fn is_dense_column(tasks: &[Task], column_id: &ColumnId) -> bool {
    let mut orders: Vec<usize> = tasks
        .iter()
        .filter(|task| &task.column_id == column_id)
        .map(|task| task.order)
        .collect();
    orders.sort_unstable();
    orders.iter().enumerate().all(|(idx, &order)| idx == order)
}

/// Whether the columns of `project_id` carry exactly the orders `0..m-1`.
pub fn is_dense_project(columns: &[Column], project_id: &ProjectId) -> bool {
    let mut orders: Vec<usize> = columns
        .iter()
        .filter(|column| &column.project_id == project_id)
        .map(|column| column.order)
        .collect();
    orders.sort_unstable();
    orders.iter().enumerate().all(|(idx, &order)| idx == order)
}
