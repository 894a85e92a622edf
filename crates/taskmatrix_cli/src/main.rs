//! Command-line front end for the task store.
//!
//! # Responsibility
//! - Resolve config, logging and the acting user before any task operation.
//! - Map each subcommand onto one `TaskService` or job call.

use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::io::BufRead;
use std::path::PathBuf;
use taskmatrix_core::db::open_db_with;
use taskmatrix_core::engine::urgency::DAY_MS;
use taskmatrix_core::job::scheduler::SchedulerStatus;
use taskmatrix_core::{
    init_logging, init_stderr_logging, now_epoch_ms, AppConfig, Caller, NewTask, Quadrant,
    RecalcJob, RecalcScheduler, Role, SqliteTaskRepository, SqliteUserRepository, Task,
    TaskFilter, TaskPatch, TaskService, TaskView, User, UserId, UserRepository,
};
use uuid::Uuid;

type CliResult<T> = Result<T, Box<dyn Error>>;

const HOUR_MS: i64 = 60 * 60 * 1000;

#[derive(Parser)]
#[command(name = "taskmatrix", version, about = "Eisenhower-matrix task tracker")]
struct Cli {
    /// TOML config file; built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Acting user id.
    #[arg(long, global = true)]
    as_user: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a task owned by the acting user.
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        important: bool,
        /// Epoch milliseconds, or relative to now: `+3d`, `+12h`, `-1d`.
        #[arg(long, allow_hyphen_values = true)]
        deadline: Option<String>,
    },

    /// List visible tasks.
    List {
        /// Q1, Q2, Q3 or Q4.
        #[arg(long)]
        quadrant: Option<String>,
        /// `completed` or `pending`.
        #[arg(long)]
        status: Option<String>,
        /// Open tasks due within the current UTC day.
        #[arg(long, conflicts_with_all = ["quadrant", "status"])]
        due_today: bool,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Show one task with its deadline status.
    Show { id: Uuid },

    /// Case-insensitive search over title and description.
    Search { keyword: String },

    /// Mark a task completed.
    Complete { id: Uuid },

    /// Reopen a completed task.
    Reopen { id: Uuid },

    /// Edit a task; classification follows importance and deadline.
    Edit {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        important: Option<bool>,
        #[arg(long, allow_hyphen_values = true)]
        deadline: Option<String>,
        #[arg(long, conflicts_with = "deadline")]
        clear_deadline: bool,
    },

    /// Delete a task.
    Delete { id: Uuid },

    /// Quadrant counts and deadline adherence.
    Stats,

    /// Run one recalculation pass now.
    Recalc,

    /// Run the recalculation scheduler until stdin closes.
    Scheduler,

    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a user and print its id.
    Add {
        nickname: String,
        #[arg(long)]
        admin: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    match &config.logging.dir {
        Some(dir) => init_logging(&config.logging.level, dir)?,
        None => init_stderr_logging(&config.logging.level)?,
    }

    let conn = open_db_with(&config.database.path, &config.store_options())?;
    let now = now_epoch_ms();

    match cli.command {
        Commands::User {
            action: UserAction::Add { nickname, admin },
        } => {
            let role = if admin { Role::Admin } else { Role::User };
            let user = User::new(nickname, role)?;
            SqliteUserRepository::new(&conn).create_user(&user)?;
            info!("event=user_create module=cli status=ok role={}", user.role.as_str());
            println!("{} {} {}", user.id, user.nickname, user.role.as_str());
            return Ok(());
        }
        Commands::Recalc => {
            let job = RecalcJob::with_policy(
                SqliteTaskRepository::new(&conn),
                config.urgency_policy(),
            );
            let summary = job.run_tick(now)?;
            println!(
                "inspected={} updated={} skipped={}",
                summary.inspected, summary.updated, summary.skipped
            );
            return Ok(());
        }
        Commands::Scheduler => {
            drop(conn);
            return run_scheduler(&config);
        }
        _ => {}
    }

    let caller = resolve_caller(&SqliteUserRepository::new(&conn), cli.as_user)?;
    let service =
        TaskService::with_policy(SqliteTaskRepository::new(&conn), config.urgency_policy());

    match cli.command {
        Commands::Add {
            title,
            description,
            important,
            deadline,
        } => {
            let deadline_at = deadline
                .as_deref()
                .map(|value| parse_deadline(value, now))
                .transpose()?;
            let view = service.create_task(
                &caller,
                NewTask {
                    title,
                    description,
                    is_important: important,
                    deadline_at,
                },
                now,
            )?;
            print_view(&view);
        }
        Commands::List {
            quadrant,
            status,
            due_today,
            limit,
            offset,
        } => {
            if due_today {
                for view in service.list_due_today(&caller, now)? {
                    print_view(&view);
                }
                return Ok(());
            }
            let tasks = match (quadrant, status) {
                (Some(quadrant), None) => service.list_by_quadrant(&caller, &quadrant)?,
                (None, Some(status)) => service.list_by_status(&caller, &status)?,
                (quadrant, status) => {
                    let filter = TaskFilter {
                        quadrant: quadrant.as_deref().map(parse_quadrant).transpose()?,
                        completed: status.as_deref().map(parse_status).transpose()?,
                        limit,
                        offset,
                    };
                    service.list_tasks(&caller, &filter)?
                }
            };
            for task in &tasks {
                print_task(task);
            }
        }
        Commands::Show { id } => print_view(&service.get_task(&caller, id, now)?),
        Commands::Search { keyword } => {
            for task in service.search_tasks(&caller, &keyword)? {
                print_task(&task);
            }
        }
        Commands::Complete { id } => print_view(&service.complete_task(&caller, id, now)?),
        Commands::Reopen { id } => {
            let patch = TaskPatch {
                completed: Some(false),
                ..TaskPatch::default()
            };
            print_view(&service.update_task(&caller, id, patch, now)?);
        }
        Commands::Edit {
            id,
            title,
            description,
            important,
            deadline,
            clear_deadline,
        } => {
            let deadline_at = if clear_deadline {
                Some(None)
            } else {
                deadline
                    .as_deref()
                    .map(|value| parse_deadline(value, now).map(Some))
                    .transpose()?
            };
            let patch = TaskPatch {
                title,
                description: description.map(Some),
                is_important: important,
                deadline_at,
                completed: None,
            };
            print_view(&service.update_task(&caller, id, patch, now)?);
        }
        Commands::Delete { id } => {
            let deleted = service.delete_task(&caller, id)?;
            println!("deleted {} {}", deleted.id, deleted.title);
        }
        Commands::Stats => {
            let stats = service.task_stats(&caller)?;
            let timing = service.timing_stats(&caller, now)?;
            println!(
                "total={} completed={} pending={}",
                stats.total, stats.completed, stats.pending
            );
            for quadrant in Quadrant::ALL {
                println!("{quadrant}={}", stats.count(quadrant));
            }
            println!(
                "completed_on_time={} completed_late={} on_plan_pending={} overdue_pending={}",
                timing.completed_on_time,
                timing.completed_late,
                timing.on_plan_pending,
                timing.overdue_pending
            );
        }
        Commands::User { .. } | Commands::Recalc | Commands::Scheduler => {}
    }
    Ok(())
}

fn resolve_caller(users: &SqliteUserRepository<'_>, as_user: Option<UserId>) -> CliResult<Caller> {
    let id = as_user.ok_or("--as-user <uuid> is required for task commands")?;
    let user = users
        .get_user(id)?
        .ok_or_else(|| format!("unknown user {id}"))?;
    Ok(user.caller())
}

fn run_scheduler(config: &AppConfig) -> CliResult<()> {
    let scheduler = RecalcScheduler::start(config.scheduler_config())?;
    println!(
        "scheduler running ({}); commands: run, status, quit",
        config.recalc.schedule
    );

    for line in std::io::stdin().lock().lines() {
        match line?.trim() {
            "run" => match scheduler.run_now() {
                Ok(summary) => {
                    println!(
                        "inspected={} updated={} skipped={}",
                        summary.inspected, summary.updated, summary.skipped
                    )
                }
                Err(err) => println!("tick failed: {err}"),
            },
            "status" => print_status(&scheduler.status()),
            "quit" | "exit" => break,
            "" => {}
            other => println!("unknown command `{other}`"),
        }
    }

    scheduler.stop();
    Ok(())
}

fn print_status(status: &SchedulerStatus) {
    let last_run = status
        .last_run
        .map_or_else(|| "never".to_string(), |at| at.to_string());
    println!(
        "ticks={} last_run={last_run} tasks_updated={}",
        status.ticks_attempted, status.tasks_updated
    );
    if let Some(summary) = status.last_summary {
        println!(
            "last_inspected={} last_updated={}",
            summary.inspected, summary.updated
        );
    }
    if let Some(error) = &status.last_error {
        println!("last_error={error}");
    }
}

fn print_task(task: &Task) {
    let deadline = task
        .deadline_at
        .map_or_else(|| "-".to_string(), |at| at.to_string());
    println!(
        "{} {} {} deadline={} {}",
        task.id,
        task.quadrant,
        if task.completed { "done" } else { "open" },
        deadline,
        task.title
    );
}

fn print_view(view: &TaskView) {
    print_task(&view.task);
    match view.days_until_deadline {
        Some(days) => println!("  {} ({days} days)", view.status_label()),
        None => println!("  {}", view.status_label()),
    }
    if let Some(description) = &view.task.description {
        println!("  {description}");
    }
}

fn parse_quadrant(value: &str) -> CliResult<Quadrant> {
    Quadrant::parse(value.trim()).ok_or_else(|| format!("unknown quadrant `{value}`").into())
}

fn parse_status(value: &str) -> CliResult<bool> {
    match value.trim() {
        "completed" => Ok(true),
        "pending" => Ok(false),
        other => Err(format!("unknown status `{other}`; expected completed|pending").into()),
    }
}

/// Parses an absolute epoch-ms deadline or a signed `Nd` / `Nh` offset from `now`.
///
/// A signed value without a unit suffix is an absolute timestamp.
fn parse_deadline(value: &str, now: i64) -> CliResult<i64> {
    let value = value.trim();
    let signed = value.starts_with('+') || value.starts_with('-');
    let offset = if let Some(days) = value.strip_suffix('d') {
        Some((days, DAY_MS))
    } else {
        value.strip_suffix('h').map(|hours| (hours, HOUR_MS))
    };

    match offset {
        Some((amount, scale)) if signed => {
            let amount: i64 = amount
                .parse()
                .map_err(|_| format!("invalid deadline offset `{value}`"))?;
            amount
                .checked_mul(scale)
                .and_then(|offset| now.checked_add(offset))
                .ok_or_else(|| format!("deadline offset `{value}` is out of range").into())
        }
        Some(_) => Err(format!("deadline offset `{value}` must start with + or -").into()),
        None => value.parse().map_err(|_| {
            format!("invalid deadline `{value}`; expected epoch ms or +Nd/+Nh").into()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_deadline, parse_status, HOUR_MS};
    use taskmatrix_core::engine::urgency::DAY_MS;

    const NOW: i64 = 1_760_000_000_000;

    #[test]
    fn relative_deadlines_offset_from_now() {
        assert_eq!(parse_deadline("+3d", NOW).unwrap(), NOW + 3 * DAY_MS);
        assert_eq!(parse_deadline("-12h", NOW).unwrap(), NOW - 12 * HOUR_MS);
    }

    #[test]
    fn absolute_deadline_is_epoch_ms() {
        assert_eq!(parse_deadline("1760000000000", NOW).unwrap(), NOW);
        assert!(parse_deadline("tomorrow", NOW).is_err());
        assert!(parse_deadline("+3w", NOW).is_err());
        assert!(parse_deadline("3d", NOW).is_err());
    }

    #[test]
    fn signed_value_without_unit_is_absolute() {
        assert_eq!(parse_deadline("-1000", NOW).unwrap(), -1000);
        assert_eq!(parse_deadline("+1760000000000", NOW).unwrap(), NOW);
    }

    #[test]
    fn status_accepts_known_values() {
        assert!(parse_status("completed").unwrap());
        assert!(!parse_status("pending").unwrap());
        assert!(parse_status("done").is_err());
    }
}
