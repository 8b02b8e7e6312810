use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::TempDir;

use agile_board::board::{AlwaysConfirm, Board};
use agile_board::error::BoardError;
use agile_board::ordering;
use agile_board::storage::{JsonDirStore, KeyValueStore, TASKS_KEY};
use agile_board::types::{ColumnId, ProjectDraft, ProjectId, TaskDraft, TaskId};
use agile_board::views::{self, BoardViews};

fn open_board(dir: &Path) -> Result<Board> {
    let store = JsonDirStore::open(dir)?;
    Ok(Board::load(Box::new(store)))
}

fn column_named(board: &Board, project: &ProjectId, name: &str) -> Result<ColumnId> {
    views::columns_by_project(board.columns(), project)
        .into_iter()
        .find(|column| column.name == name)
        .map(|column| column.id)
        .with_context(|| format!("column '{name}' should exist"))
}

fn titles_in(board: &Board, column: &ColumnId) -> Vec<String> {
    let columns = board.columns().to_vec();
    views::tasks_by_column(board.tasks(), &columns)
        .remove(column)
        .unwrap_or_default()
        .into_iter()
        .map(|task| task.title)
        .collect()
}

fn seeded_project(board: &mut Board) -> Result<ProjectId> {
    let project = board.create_project(ProjectDraft {
        name: "Release".to_string(),
        description: "v2 launch".to_string(),
    })?;
    Ok(project.id)
}

#[test]
fn board_survives_reload_from_disk() -> Result<()> {
    let temp = TempDir::new()?;
    let (project, todo) = {
        let mut board = open_board(temp.path())?;
        let project = seeded_project(&mut board)?;
        let todo = column_named(&board, &project, "To Do")?;
        for title in ["write notes", "tag build", "announce"] {
            board.add_task(TaskDraft::new(todo.clone(), title))?;
        }
        (project, todo)
    };

    for key in ["projects", "columns", "tasks"] {
        assert!(temp.path().join(format!("{key}.json")).exists());
    }

    let board = open_board(temp.path())?;
    assert_eq!(board.projects().len(), 1);
    assert_eq!(board.project(&project).map(|p| p.name.as_str()), Some("Release"));
    assert_eq!(
        titles_in(&board, &todo),
        vec!["write notes", "tag build", "announce"]
    );
    Ok(())
}

#[test]
fn deleting_project_cascades_to_columns_and_tasks() -> Result<()> {
    let temp = TempDir::new()?;
    let mut board = open_board(temp.path())?;
    let doomed = seeded_project(&mut board)?;
    let survivor = board.create_project(ProjectDraft {
        name: "Keep".to_string(),
        description: String::new(),
    })?;
    let backlog = column_named(&board, &doomed, "Backlog")?;
    board.add_task(TaskDraft::new(backlog, "lost"))?;
    let kept = column_named(&board, &survivor.id, "Backlog")?;
    board.add_task(TaskDraft::new(kept, "kept"))?;

    board.delete_project(&doomed, &AlwaysConfirm)?;

    assert!(board.project(&doomed).is_none());
    assert!(board.columns().iter().all(|c| c.project_id != doomed));
    assert!(board.tasks().iter().all(|t| t.project_id != doomed));
    assert_eq!(board.tasks().len(), 1);

    let reloaded = open_board(temp.path())?;
    assert_eq!(reloaded.projects().len(), 1);
    assert_eq!(reloaded.columns().len(), 4);
    assert_eq!(reloaded.tasks().len(), 1);
    Ok(())
}

#[test]
fn declined_confirmation_leaves_storage_untouched() -> Result<()> {
    let temp = TempDir::new()?;
    let mut board = open_board(temp.path())?;
    let project = seeded_project(&mut board)?;
    let before = fs::read_to_string(temp.path().join("projects.json"))?;

    let decline = |_: &str| false;
    let err = board
        .delete_project(&project, &decline)
        .expect_err("declined delete should be cancelled");

    assert_eq!(err, BoardError::Cancelled);
    assert_eq!(fs::read_to_string(temp.path().join("projects.json"))?, before);
    Ok(())
}

#[test]
fn non_empty_column_cannot_be_deleted() -> Result<()> {
    let temp = TempDir::new()?;
    let mut board = open_board(temp.path())?;
    let project = seeded_project(&mut board)?;
    let doing = column_named(&board, &project, "In Progress")?;
    let task = board.add_task(TaskDraft::new(doing.clone(), "busy"))?;

    let err = board
        .delete_column(&doing, &AlwaysConfirm)
        .expect_err("column with tasks must be kept");
    assert!(matches!(err, BoardError::ColumnNotEmpty { count: 1, .. }));
    assert!(board.column(&doing).is_some());

    board.delete_task(&task.id, &AlwaysConfirm)?;
    board.delete_column(&doing, &AlwaysConfirm)?;

    assert!(board.column(&doing).is_none());
    assert!(ordering::is_dense_project(board.columns(), &project));
    Ok(())
}

#[test]
fn progress_tracks_done_column() -> Result<()> {
    let temp = TempDir::new()?;
    let mut board = open_board(temp.path())?;
    let project = seeded_project(&mut board)?;
    let todo = column_named(&board, &project, "To Do")?;
    let done = column_named(&board, &project, "Done")?;
    let mut views = BoardViews::new();

    let first = board.add_task(TaskDraft::new(todo.clone(), "one"))?;
    board.add_task(TaskDraft::new(todo.clone(), "two"))?;
    board.add_task(TaskDraft::new(todo, "three"))?;
    let progress = views
        .project_progress(&board, &project)
        .context("project should exist")?;
    assert_eq!((progress.completed, progress.total, progress.percent), (0, 3, 0));

    board.move_task(&first.id, &done, 0)?;
    let progress = views
        .project_progress(&board, &project)
        .context("project should exist")?;
    assert_eq!((progress.completed, progress.total, progress.percent), (1, 3, 33));
    Ok(())
}

#[test]
fn moving_tasks_keeps_both_columns_dense() -> Result<()> {
    let temp = TempDir::new()?;
    let mut board = open_board(temp.path())?;
    let project = seeded_project(&mut board)?;
    let todo = column_named(&board, &project, "To Do")?;
    let doing = column_named(&board, &project, "In Progress")?;

    let mut ids: Vec<TaskId> = Vec::new();
    for title in ["a", "b", "c"] {
        ids.push(board.add_task(TaskDraft::new(todo.clone(), title))?.id);
    }
    board.add_task(TaskDraft::new(doing.clone(), "x"))?;

    board.move_task(&ids[1], &doing, 0)?;
    board.move_task(&ids[2], &todo, 0)?;

    assert_eq!(titles_in(&board, &todo), vec!["c", "a"]);
    assert_eq!(titles_in(&board, &doing), vec!["b", "x"]);
    assert!(ordering::is_dense_column(board.tasks(), &todo));
    assert!(ordering::is_dense_column(board.tasks(), &doing));
    Ok(())
}

#[test]
fn cancelled_drag_changes_nothing_on_disk() -> Result<()> {
    let temp = TempDir::new()?;
    let mut board = open_board(temp.path())?;
    let project = seeded_project(&mut board)?;
    let todo = column_named(&board, &project, "To Do")?;
    let done = column_named(&board, &project, "Done")?;
    let task = board.add_task(TaskDraft::new(todo, "drifting"))?;
    board.add_task(TaskDraft::new(done.clone(), "finished"))?;

    let store = JsonDirStore::open(temp.path())?;
    let before = store.get(TASKS_KEY)?;
    let tasks_before = board.tasks().to_vec();

    board.begin_drag(task.id.as_str())?;
    board.drag_over(done.as_str())?;
    assert_ne!(board.visible_tasks(), tasks_before.as_slice());
    board.cancel_drag()?;

    assert_eq!(board.tasks(), tasks_before.as_slice());
    assert_eq!(board.visible_tasks(), tasks_before.as_slice());
    assert_eq!(store.get(TASKS_KEY)?, before);
    Ok(())
}

#[test]
fn dropped_drag_is_persisted_with_dense_orders() -> Result<()> {
    let temp = TempDir::new()?;
    let mut board = open_board(temp.path())?;
    let project = seeded_project(&mut board)?;
    let todo = column_named(&board, &project, "To Do")?;
    let done = column_named(&board, &project, "Done")?;
    let moving = board.add_task(TaskDraft::new(todo.clone(), "moving"))?;
    board.add_task(TaskDraft::new(todo.clone(), "staying"))?;
    let anchor = board.add_task(TaskDraft::new(done.clone(), "anchor"))?;

    board.begin_drag(moving.id.as_str())?;
    board.drag_over(anchor.id.as_str())?;
    assert!(board.finish_drag(Some(anchor.id.as_str()))?);

    let reloaded = open_board(temp.path())?;
    assert_eq!(titles_in(&reloaded, &done), vec!["moving", "anchor"]);
    assert_eq!(titles_in(&reloaded, &todo), vec!["staying"]);
    assert!(ordering::is_dense_column(reloaded.tasks(), &todo));
    assert!(ordering::is_dense_column(reloaded.tasks(), &done));
    Ok(())
}

#[test]
fn column_drag_reorders_project_columns() -> Result<()> {
    let temp = TempDir::new()?;
    let mut board = open_board(temp.path())?;
    let project = seeded_project(&mut board)?;
    let backlog = column_named(&board, &project, "Backlog")?;
    let done = column_named(&board, &project, "Done")?;

    board.begin_drag(done.as_str())?;
    board.drag_over(backlog.as_str())?;
    assert!(board.finish_drag(Some(backlog.as_str()))?);

    let names: Vec<String> = views::columns_by_project(board.columns(), &project)
        .into_iter()
        .map(|column| column.name)
        .collect();
    assert_eq!(names, vec!["Done", "Backlog", "To Do", "In Progress"]);
    Ok(())
}

#[test]
fn gaps_in_stored_orders_are_repaired_on_load() -> Result<()> {
    let temp = TempDir::new()?;
    let (todo, first) = {
        let mut board = open_board(temp.path())?;
        let project = seeded_project(&mut board)?;
        let todo = column_named(&board, &project, "To Do")?;
        let first = board.add_task(TaskDraft::new(todo.clone(), "first"))?;
        board.add_task(TaskDraft::new(todo.clone(), "second"))?;
        (todo, first)
    };

    let path = temp.path().join("tasks.json");
    let raw = fs::read_to_string(&path)?;
    let mut tasks: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
    for task in &mut tasks {
        if task["id"] == serde_json::json!(first.id) {
            task["order"] = serde_json::json!(7);
        }
    }
    fs::write(&path, serde_json::to_string(&tasks)?)?;

    let board = open_board(temp.path())?;
    assert!(ordering::is_dense_column(board.tasks(), &todo));
    assert_eq!(titles_in(&board, &todo), vec!["second", "first"]);
    Ok(())
}
