//! Drag gesture state machine.
//!
//! A gesture copies the committed collections into a provisional layer on
//! `start`, splices array positions on every `hover` and only hands back a
//! reindexed snapshot on `finish`. `cancel` drops the layer, so committed
//! data is never touched mid-gesture. Order fields inside the layer may be
//! stale or duplicated until `finish` renumbers them.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{BoardError, Result};
use crate::ordering::{arrange_by_order, reindex_by_position};
use crate::types::{Column, ColumnId, ProjectId, Task, TaskId};

/// What kind of entity a gesture carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragKind {
    Task,
    Column,
}

/// The dragged entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragItem {
    Task(TaskId),
    Column(ColumnId),
}

impl DragItem {
    pub fn kind(&self) -> DragKind {
        match self {
            DragItem::Task(_) => DragKind::Task,
            DragItem::Column(_) => DragKind::Column,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            DragItem::Task(id) => id.as_str(),
            DragItem::Column(id) => id.as_str(),
        }
    }
}

/// Something the pointer is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    Task(TaskId),
    Column(ColumnId),
}

/// Reindexed collections produced by a completed gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropOutcome {
    pub item: DragItem,
    pub tasks: Vec<Task>,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone)]
struct Gesture {
    item: DragItem,
    tasks: Vec<Task>,
    columns: Vec<Column>,
    last_over: Option<String>,
}

#[derive(Debug, Clone, Default)]
enum DragState {
    #[default]
    Idle,
    Dragging(Gesture),
}

#[derive(Debug, Clone, Default)]
pub struct DragSession {
    state: DragState,
}

impl DragSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    pub fn active_item(&self) -> Option<&DragItem> {
        match &self.state {
            DragState::Dragging(gesture) => Some(&gesture.item),
            DragState::Idle => None,
        }
    }

    /// Provisional tasks in display sequence, while a gesture is active.
    pub fn provisional_tasks(&self) -> Option<&[Task]> {
        match &self.state {
            DragState::Dragging(gesture) => Some(&gesture.tasks),
            DragState::Idle => None,
        }
    }

    pub fn provisional_columns(&self) -> Option<&[Column]> {
        match &self.state {
            DragState::Dragging(gesture) => Some(&gesture.columns),
            DragState::Idle => None,
        }
    }

    /// `Idle -> Dragging`. `item_id` is looked up among tasks first, then columns.
    pub fn start(&mut self, item_id: &str, tasks: &[Task], columns: &[Column]) -> Result<DragKind> {
        if self.is_dragging() {
            return Err(BoardError::DragInProgress);
        }

        let item = if tasks.iter().any(|task| task.id.as_str() == item_id) {
            DragItem::Task(TaskId::from(item_id))
        } else if columns.iter().any(|column| column.id.as_str() == item_id) {
            DragItem::Column(ColumnId::from(item_id))
        } else {
            return Err(BoardError::InvalidDragItem {
                id: item_id.to_string(),
            });
        };

        let mut provisional_tasks = tasks.to_vec();
        arrange_by_order(&mut provisional_tasks);
        let mut provisional_columns = columns.to_vec();
        provisional_columns.sort_by_key(|column| column.order);

        let kind = item.kind();
        debug!(item = item.id(), ?kind, "drag started");
        self.state = DragState::Dragging(Gesture {
            item,
            tasks: provisional_tasks,
            columns: provisional_columns,
            last_over: None,
        });
        Ok(kind)
    }

    /// Applies a provisional move for the pointer being over `over_id`.
    ///
    /// Returns whether the provisional layer changed. Repeated reports of the
    /// same target, unknown ids and drops the dragged kind cannot land on are
    /// ignored.
    pub fn hover(&mut self, over_id: &str) -> Result<bool> {
        let DragState::Dragging(gesture) = &mut self.state else {
            return Err(BoardError::NoActiveDrag);
        };
        if gesture.last_over.as_deref() == Some(over_id) {
            return Ok(false);
        }
        let Some(target) = gesture.resolve(over_id) else {
            return Ok(false);
        };
        gesture.last_over = Some(over_id.to_string());
        Ok(gesture.apply(&target))
    }

    /// `Dragging -> Idle`, committing when `over_id` is a valid drop target.
    ///
    /// `None` or an invalid target ends the gesture like [`cancel`](Self::cancel)
    /// and yields `Ok(None)`.
    pub fn finish(&mut self, over_id: Option<&str>) -> Result<Option<DropOutcome>> {
        let DragState::Dragging(mut gesture) = std::mem::take(&mut self.state) else {
            return Err(BoardError::NoActiveDrag);
        };

        let target = over_id.and_then(|id| gesture.resolve(id));
        let Some(target) = target.filter(|target| gesture.accepts(target)) else {
            debug!(item = gesture.item.id(), "drag ended without a valid drop target");
            return Ok(None);
        };

        if gesture.last_over.as_deref() != over_id {
            gesture.apply(&target);
        }
        match &gesture.item {
            DragItem::Task(_) => reindex_by_position(&mut gesture.tasks),
            DragItem::Column(_) => reindex_columns_by_position(&mut gesture.columns),
        }

        debug!(item = gesture.item.id(), ?target, "drag finished");
        Ok(Some(DropOutcome {
            item: gesture.item,
            tasks: gesture.tasks,
            columns: gesture.columns,
        }))
    }

    /// `Dragging -> Idle`, discarding every provisional change.
    pub fn cancel(&mut self) -> Result<()> {
        match std::mem::take(&mut self.state) {
            DragState::Dragging(gesture) => {
                debug!(item = gesture.item.id(), "drag cancelled");
                Ok(())
            }
            DragState::Idle => Err(BoardError::NoActiveDrag),
        }
    }
}

impl Gesture {
    fn resolve(&self, over_id: &str) -> Option<DropTarget> {
        if self.tasks.iter().any(|task| task.id.as_str() == over_id) {
            Some(DropTarget::Task(TaskId::from(over_id)))
        } else if self.columns.iter().any(|column| column.id.as_str() == over_id) {
            Some(DropTarget::Column(ColumnId::from(over_id)))
        } else {
            None
        }
    }

    fn accepts(&self, target: &DropTarget) -> bool {
        match (&self.item, target) {
            (DragItem::Task(_), _) => true,
            (DragItem::Column(_), DropTarget::Column(_)) => true,
            (DragItem::Column(_), DropTarget::Task(_)) => false,
        }
    }

    fn apply(&mut self, target: &DropTarget) -> bool {
        match (&self.item, target) {
            (DragItem::Task(active), DropTarget::Task(over)) => {
                let (active, over) = (active.clone(), over.clone());
                self.task_over_task(&active, &over)
            }
            (DragItem::Task(active), DropTarget::Column(column)) => {
                let (active, column) = (active.clone(), column.clone());
                self.task_over_column(&active, &column)
            }
            (DragItem::Column(active), DropTarget::Column(over)) => {
                let (active, over) = (active.clone(), over.clone());
                self.column_over_column(&active, &over)
            }
            (DragItem::Column(_), DropTarget::Task(_)) => false,
        }
    }

    fn task_index(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| &task.id == id)
    }

    fn task_over_task(&mut self, active: &TaskId, over: &TaskId) -> bool {
        if active == over {
            return false;
        }
        let (Some(from), Some(to)) = (self.task_index(active), self.task_index(over)) else {
            return false;
        };

        let over_column = self.tasks[to].column_id.clone();
        let over_project = self.tasks[to].project_id.clone();
        if self.tasks[from].column_id == over_column {
            array_move(&mut self.tasks, from, to);
        } else {
            // Entering another column: take the hovered task's slot.
            let mut dragged = self.tasks.remove(from);
            dragged.column_id = over_column;
            dragged.project_id = over_project;
            let slot = self.task_index(over).unwrap_or(self.tasks.len());
            self.tasks.insert(slot, dragged);
        }
        true
    }

    fn task_over_column(&mut self, active: &TaskId, column_id: &ColumnId) -> bool {
        let Some(from) = self.task_index(active) else {
            return false;
        };
        if &self.tasks[from].column_id == column_id {
            return false;
        }
        let Some(project_id) = self
            .columns
            .iter()
            .find(|column| &column.id == column_id)
            .map(|column| column.project_id.clone())
        else {
            return false;
        };

        let mut dragged = self.tasks.remove(from);
        dragged.column_id = column_id.clone();
        dragged.project_id = project_id;
        let slot = self
            .tasks
            .iter()
            .rposition(|task| &task.column_id == column_id)
            .map(|last| last + 1)
            .unwrap_or(self.tasks.len());
        self.tasks.insert(slot, dragged);
        true
    }

    fn column_over_column(&mut self, active: &ColumnId, over: &ColumnId) -> bool {
        if active == over {
            return false;
        }
        let from = self.columns.iter().position(|column| &column.id == active);
        let to = self.columns.iter().position(|column| &column.id == over);
        let (Some(from), Some(to)) = (from, to) else {
            return false;
        };
        if self.columns[from].project_id != self.columns[to].project_id {
            return false;
        }
        array_move(&mut self.columns, from, to);
        true
    }
}

/// Removes the element at `from` and reinserts it at `to`.
fn array_move<T>(items: &mut Vec<T>, from: usize, to: usize) {
    let item = items.remove(from);
    items.insert(to.min(items.len()), item);
}

fn reindex_columns_by_position(columns: &mut [Column]) {
    let mut counters: HashMap<ProjectId, usize> = HashMap::new();
    for column in columns.iter_mut() {
        let next = counters.entry(column.project_id.clone()).or_insert(0);
        column.order = *next;
        *next += 1;
    }
}
