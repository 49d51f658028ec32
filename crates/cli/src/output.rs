// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Renders a build/deploy/install-deps status stream (spec §4.6): a live,
//! repositioning multi-line view on a TTY, one immutable line per event
//! otherwise. Mirrors the teacher's `should_colorize` TTY-detection split
//! in `color.rs`, applied to progress rendering instead of ANSI color.

use std::io::{IsTerminal, Write};

use anvil_core::{PackageTaskId, Stage};
use anvil_wire::status::TaskProgress;
use anvil_wire::StatusEvent;
use indexmap::IndexMap;

/// Whether output should use the live, cursor-repositioning view.
pub fn should_use_live_view() -> bool {
    if std::env::var("NO_COLOR").is_ok_and(|v| v == "1") {
        return false;
    }
    std::io::stdout().is_terminal()
}

struct TaskRow {
    name: String,
    version: String,
    stage: Stage,
    progress: Option<TaskProgress>,
    done: bool,
}

impl TaskRow {
    fn render(&self) -> String {
        let marker = if self.done { "done" } else { stage_label(self.stage) };
        match &self.progress {
            Some(TaskProgress::Percent { value }) => format!("  {} {} [{marker}] {value}%", self.name, self.version),
            Some(TaskProgress::Text { value }) => format!("  {} {} [{marker}] {value}", self.name, self.version),
            None => format!("  {} {} [{marker}]", self.name, self.version),
        }
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Pending => "pending",
        Stage::Downloading => "downloading",
        Stage::Unpacking => "unpacking",
        Stage::Installing => "installing",
        Stage::Done => "done",
        Stage::Failed => "failed",
        Stage::Cancelled => "cancelled",
    }
}

/// Renders a stream of [`StatusEvent`]s to stdout, choosing a live
/// multi-line view or plain immutable lines based on [`should_use_live_view`].
pub struct StreamRenderer {
    live: bool,
    tasks: IndexMap<PackageTaskId, TaskRow>,
    lines_drawn: usize,
}

impl StreamRenderer {
    pub fn new() -> Self {
        Self { live: should_use_live_view(), tasks: IndexMap::new(), lines_drawn: 0 }
    }

    pub fn handle(&mut self, event: &StatusEvent) {
        match event {
            StatusEvent::PackageTask { task_id, name, version, stage, progress } => {
                let row = self.tasks.entry(*task_id).or_insert_with(|| TaskRow {
                    name: name.clone(),
                    version: version.clone(),
                    stage: *stage,
                    progress: None,
                    done: false,
                });
                row.stage = *stage;
                row.progress = progress.clone();
                row.done = matches!(stage, Stage::Done);
                if self.live {
                    self.redraw();
                } else {
                    println!("{}", row.render());
                }
            }
            StatusEvent::PackageSummary { total, active, done } => {
                let line = format!("{done}/{total} done, {active} active");
                if self.live {
                    self.redraw_with_summary(&line);
                } else {
                    println!("{line}");
                }
            }
            StatusEvent::CompileUnit { source, skipped } => {
                let verb = if *skipped { "skip" } else { "compile" };
                println!("  {verb} {source}");
            }
            StatusEvent::Log { line } => {
                println!("{line}");
            }
            StatusEvent::Terminal { status, exit_code, message } => {
                if let Some(message) = message {
                    println!("{message}");
                }
                println!("{status} (exit {exit_code})");
            }
        }
    }

    fn redraw(&mut self) {
        self.redraw_with_summary("");
    }

    /// Moves the cursor up over the previously drawn block and overwrites it
    /// in place, rather than appending a fresh block every tick.
    fn redraw_with_summary(&mut self, summary: &str) {
        let mut stdout = std::io::stdout();
        for _ in 0..self.lines_drawn {
            let _ = write!(stdout, "\x1b[1A\x1b[2K");
        }
        let mut count = 0;
        for row in self.tasks.values() {
            let _ = writeln!(stdout, "{}", row.render());
            count += 1;
        }
        if !summary.is_empty() {
            let _ = writeln!(stdout, "{summary}");
            count += 1;
        }
        self.lines_drawn = count;
        let _ = stdout.flush();
    }
}

impl Default for StreamRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_row_renders_percent_progress() {
        let row = TaskRow {
            name: "platform-esp32".into(),
            version: "3.3.5".into(),
            stage: Stage::Downloading,
            progress: Some(TaskProgress::Percent { value: 40 }),
            done: false,
        };
        assert_eq!(row.render(), "  platform-esp32 3.3.5 [downloading] 40%");
    }

    #[test]
    fn task_row_marks_done_regardless_of_stage_label() {
        let row = TaskRow {
            name: "lib-wire".into(),
            version: "1.0.0".into(),
            stage: Stage::Done,
            progress: None,
            done: true,
        };
        assert_eq!(row.render(), "  lib-wire 1.0.0 [done]");
    }

    #[test]
    fn handling_a_package_task_event_tracks_it_by_id() {
        let mut renderer = StreamRenderer { live: false, tasks: IndexMap::new(), lines_drawn: 0 };
        let id = PackageTaskId::new();
        renderer.handle(&StatusEvent::PackageTask {
            task_id: id,
            name: "toolchain-avr".into(),
            version: "7.3.0".into(),
            stage: Stage::Unpacking,
            progress: Some(TaskProgress::Text { value: "extracting".into() }),
        });
        assert_eq!(renderer.tasks.len(), 1);
        assert_eq!(renderer.tasks[&id].stage, Stage::Unpacking);
    }
}
