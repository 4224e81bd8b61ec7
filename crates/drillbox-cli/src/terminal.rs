//! Plain terminal frontend for practice sessions.

use std::io::{BufRead, Write};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use drillbox_core::session::{SessionFrontend, TaskBriefing};
use drillbox_core::validation::ValidationResult;
use drillbox_core::{DrillError, Result};

const RULE: &str = "============================================================";

#[derive(Debug, Default)]
pub struct TerminalFrontend;

impl TerminalFrontend {
    pub fn new() -> Self {
        Self
    }
}

/// Block on one line of stdin without stalling the runtime. Ctrl-C while
/// waiting interrupts the session.
async fn wait_for_enter(prompt: &str) -> Result<()> {
    print!("{prompt}");
    std::io::stdout().flush()?;

    let read = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).map(|_| ())
    });
    tokio::select! {
        joined = read => match joined {
            Ok(result) => Ok(result?),
            Err(e) => Err(std::io::Error::other(e).into()),
        },
        _ = tokio::signal::ctrl_c() => Err(DrillError::Interrupted),
    }
}

pub fn briefing_text(briefing: &TaskBriefing) -> String {
    let scenario = &briefing.scenario;
    let mut out = String::new();
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!(
        "Scenario {} [{} / {}] - {} points\n",
        scenario.id, scenario.category, scenario.difficulty, scenario.points
    ));
    out.push_str(RULE);
    out.push_str("\n\n");
    out.push_str(scenario.task.trim_end());
    out.push_str("\n\n");

    if let Some(limit) = scenario.time_limit {
        out.push_str(&format!("Suggested time limit: {} minutes\n", limit.div_ceil(60)));
    }
    if !scenario.hints.is_empty() {
        out.push_str("Hints:\n");
        for hint in &scenario.hints {
            out.push_str(&format!("  - {hint}\n"));
        }
    }
    if !briefing.setup_warnings.is_empty() {
        out.push_str("\nSome setup steps did not complete; the task may behave differently:\n");
        for warning in &briefing.setup_warnings {
            out.push_str(&format!(
                "  ! step {} `{}` exited with {}\n",
                warning.index + 1,
                warning.command,
                warning.exit_code
            ));
        }
    }
    out.push_str(&format!("\nSandbox: {}\n", briefing.sandbox_name));
    if briefing.check_helper {
        out.push_str("Run `drill-check` inside the sandbox to check your progress.\n");
    }
    out.push_str("Exit the shell when you are done to run the final validation.\n");
    out
}

#[async_trait]
impl SessionFrontend for TerminalFrontend {
    async fn present_task(&self, briefing: &TaskBriefing) -> Result<()> {
        println!("{}", briefing_text(briefing));
        wait_for_enter("Press Enter to open a shell in the sandbox... ").await
    }

    async fn interact(&self, shell: &[String]) -> Result<()> {
        let Some((program, args)) = shell.split_first() else {
            return Ok(());
        };
        let mut child = Command::new(program).args(args).kill_on_drop(true).spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                debug!(?status, "sandbox shell exited");
                Ok(())
            }
            _ = tokio::signal::ctrl_c() => Err(DrillError::Interrupted),
        }
    }

    async fn show_feedback(&self, result: &ValidationResult, score: u32, max_score: u32) {
        println!();
        println!("{}", result.feedback);
        println!();
        println!("Score: {score} (scenario base: {max_score} points)");
    }
}
