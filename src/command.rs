//! Newline-delimited JSON command protocol for `goalkeeperd`.
//!
//! Each stdin line is one [`EngineCommand`]; each gets exactly one
//! [`CommandResponse`] line on stdout. Diagnostic output goes to stderr.

use crate::engine::GoalEngine;
use crate::goal::{GoalSnapshot, GoalTransition, UserId};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// A request to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum EngineCommand {
    /// Set today's goal and (re)start reminders.
    SetGoal {
        user_id: UserId,
        contact: String,
        goal_points: i64,
    },
    /// Log points for today (negative to undo).
    LogPoints {
        user_id: UserId,
        contact: String,
        points: i64,
    },
    /// Stop reminders for a user.
    Stop { user_id: UserId },
    /// List tracked users.
    Status,
}

/// Reply to one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResponse {
    GoalSet {
        user_id: UserId,
        generation: u64,
        reference_day: chrono::NaiveDate,
    },
    PointsLogged {
        user_id: UserId,
        snapshot: GoalSnapshot,
        transition: GoalTransition,
        tracking: bool,
    },
    Stopped {
        user_id: UserId,
        was_tracking: bool,
    },
    Status {
        tracked_users: Vec<UserId>,
        live_timers: usize,
    },
    Error {
        message: String,
    },
}

impl CommandResponse {
    fn error(message: impl std::fmt::Display) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

/// Apply one command to the engine.
pub async fn dispatch(engine: &GoalEngine, command: EngineCommand) -> CommandResponse {
    match command {
        EngineCommand::SetGoal {
            user_id,
            contact,
            goal_points,
        } => match engine
            .set_goal(user_id, &contact, engine.today(), goal_points)
            .await
        {
            Ok(ticket) => CommandResponse::GoalSet {
                user_id,
                generation: ticket.generation,
                reference_day: ticket.reference_day,
            },
            Err(e) => CommandResponse::error(e),
        },
        EngineCommand::LogPoints {
            user_id,
            contact,
            points,
        } => match engine.record_points(user_id, &contact, points).await {
            Ok((snapshot, transition)) => CommandResponse::PointsLogged {
                user_id,
                snapshot,
                transition,
                tracking: engine.registry().is_tracking(user_id),
            },
            Err(e) => CommandResponse::error(e),
        },
        EngineCommand::Stop { user_id } => CommandResponse::Stopped {
            user_id,
            was_tracking: engine.stop_tracking(user_id),
        },
        EngineCommand::Status => {
            let mut tracked_users = engine.registry().tracked_users();
            tracked_users.sort();
            CommandResponse::Status {
                tracked_users,
                live_timers: engine.registry().live_timers(),
            }
        }
    }
}

/// Parse and dispatch one input line. Blank lines yield `None`.
pub async fn handle_line(engine: &GoalEngine, line: &str) -> Option<CommandResponse> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let response = match serde_json::from_str::<EngineCommand>(line) {
        Ok(command) => dispatch(engine, command).await,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting malformed command");
            CommandResponse::error(format!("invalid command: {e}"))
        }
    };
    Some(response)
}

/// Serve commands from `reader` until EOF, writing one response per line.
pub async fn serve<R, W>(engine: &GoalEngine, reader: R, mut writer: W) -> crate::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(response) = handle_line(engine, &line).await else {
            continue;
        };
        let json = serde_json::to_string(&response)
            .map_err(|e| crate::EngineError::Io(std::io::Error::other(e)))?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    tracing::info!("command input closed");
    Ok(())
}
