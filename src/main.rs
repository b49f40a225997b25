//! quotidien - a trading-day daily job scheduler.
//!
//! Usage:
//!   qd run <PROGRAM> [ARGS]...   Run a command once per trading day
//!   qd preview                   Show upcoming execution instants

use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use quotidien::{
    CommandJob, ConfigError, FailurePolicy, LogRotator, PidFile, RotatingWriter, RotationPeriod,
    ScheduleConfig, Scheduler, ShutdownCoordinator, is_trading_day,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// qd - run a job once per trading day within a bounded lifetime
#[derive(Parser)]
#[command(name = "qd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RotationArg {
    Daily,
    Monthly,
}

impl From<RotationArg> for RotationPeriod {
    fn from(arg: RotationArg) -> Self {
        match arg {
            RotationArg::Daily => RotationPeriod::Daily,
            RotationArg::Monthly => RotationPeriod::Monthly,
        }
    }
}

/// Schedule flags shared by `run` and `preview`.
#[derive(Args)]
struct ScheduleOpts {
    /// Hour the execution window opens (0-23)
    #[arg(long, default_value = "17")]
    hour: u32,

    /// Minute the execution window opens (0-59)
    #[arg(long, default_value = "10")]
    minute: u32,

    /// Window width in minutes
    #[arg(long, default_value = "5")]
    tolerance: u32,

    /// Scheduler lifetime in days
    #[arg(long, default_value = "40")]
    days: u32,

    /// Maximum number of successful executions
    #[arg(long, default_value = "30")]
    max_executions: u32,

    /// IANA timezone the window is evaluated in
    #[arg(long, default_value = "UTC")]
    timezone: String,
}

impl ScheduleOpts {
    fn build(&self, policy: FailurePolicy) -> Result<ScheduleConfig, ConfigError> {
        ScheduleConfig::builder(self.hour, self.minute)
            .tolerance_minutes(self.tolerance)
            .lifetime_days(self.days)
            .max_executions(self.max_executions)
            .timezone(self.timezone.clone())
            .failure_policy(policy)
            .build()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command once per trading day until the lifetime ends
    Run {
        /// Program to execute
        #[arg(value_name = "PROGRAM")]
        program: String,

        /// Arguments passed to the program (put scheduler flags before it)
        #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        #[command(flatten)]
        schedule: ScheduleOpts,

        /// Keep scheduling after a failed execution instead of stopping
        #[arg(long)]
        continue_on_failure: bool,

        /// Execute once at startup regardless of the window
        /// (also enabled by RUN_IMMEDIATELY=true)
        #[arg(long)]
        run_immediately: bool,

        /// Directory for rotated log files
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,

        /// Log file name prefix
        #[arg(long, default_value = "scheduler")]
        log_prefix: String,

        /// Log rotation granularity
        #[arg(long, value_enum, default_value = "monthly")]
        rotation: RotationArg,

        /// Write a pid file here; removed again on clean shutdown
        #[arg(long)]
        pid_file: Option<PathBuf>,

        /// Kill the command if it runs longer than this many seconds
        #[arg(long)]
        command_timeout: Option<u64>,

        /// Working directory for the command
        #[arg(long)]
        working_dir: Option<PathBuf>,
    },

    /// Show the next scheduled execution instants without running
    Preview {
        #[command(flatten)]
        schedule: ScheduleOpts,

        /// How many instants to show
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            program,
            args,
            schedule,
            continue_on_failure,
            run_immediately,
            log_dir,
            log_prefix,
            rotation,
            pid_file,
            command_timeout,
            working_dir,
        } => {
            run_scheduler(RunArgs {
                program,
                args,
                schedule,
                continue_on_failure,
                run_immediately,
                log_dir,
                log_prefix,
                rotation,
                pid_file,
                command_timeout,
                working_dir,
            })
            .await
        }
        Commands::Preview {
            schedule,
            count,
            json,
        } => preview(&schedule, count, json),
    }
}

struct RunArgs {
    program: String,
    args: Vec<String>,
    schedule: ScheduleOpts,
    continue_on_failure: bool,
    run_immediately: bool,
    log_dir: PathBuf,
    log_prefix: String,
    rotation: RotationArg,
    pid_file: Option<PathBuf>,
    command_timeout: Option<u64>,
    working_dir: Option<PathBuf>,
}

/// Run the scheduler around an external command.
async fn run_scheduler(args: RunArgs) -> ExitCode {
    // Logging goes to the rotated file and stdout. The rotator is shared
    // with the scheduler, which swaps the file across period boundaries.
    let rotator = Arc::new(LogRotator::new(
        args.log_dir,
        args.log_prefix,
        args.rotation.into(),
    ));
    let writer = RotatingWriter::new(Arc::clone(&rotator));
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(writer.and(std::io::stdout))
        .with_ansi(false)
        .init();

    let policy = if args.continue_on_failure {
        FailurePolicy::ContinueNextWindow
    } else {
        FailurePolicy::FailFast
    };
    let config = match args.schedule.build(policy) {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid schedule configuration");
            return ExitCode::FAILURE;
        }
    };

    let _pid_file = match args.pid_file.map(PidFile::create).transpose() {
        Ok(guard) => guard,
        Err(error) => {
            error!(%error, "failed to write pid file");
            return ExitCode::FAILURE;
        }
    };

    let coordinator = ShutdownCoordinator::new();
    if let Err(error) = coordinator.install() {
        error!(%error, "failed to install signal handlers");
        return ExitCode::FAILURE;
    }

    let run_immediately = args.run_immediately || env_run_immediately();

    let mut builder = CommandJob::builder(args.program.clone()).args(args.args);
    if let Some(dir) = args.working_dir {
        builder = builder.working_dir(dir);
    }
    if let Some(secs) = args.command_timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    let job = Arc::new(builder.build());

    info!(program = %args.program, "press ctrl-c or send SIGTERM to stop");

    let summary = Scheduler::new(config, job)
        .with_shutdown_flag(coordinator.flag())
        .with_log_rotator(rotator)
        .with_run_immediately(run_immediately)
        .run()
        .await;

    if summary.cause.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Operational override: force one execution at startup.
fn env_run_immediately() -> bool {
    std::env::var("RUN_IMMEDIATELY")
        .map(|v| {
            let v = v.to_lowercase();
            v == "true" || v == "1"
        })
        .unwrap_or(false)
}

/// Print the next scheduled execution instants.
fn preview(schedule: &ScheduleOpts, count: usize, json: bool) -> ExitCode {
    let config = match schedule.build(FailurePolicy::FailFast) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("invalid schedule configuration: {error}");
            return ExitCode::FAILURE;
        }
    };

    let now = Utc::now();
    let lifetime = chrono::Duration::from_std(config.lifetime())
        .unwrap_or_else(|_| chrono::Duration::zero());
    let end_time = now
        .checked_add_signed(lifetime)
        .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);

    let mut instants = Vec::with_capacity(count);
    // Today's window still counts if it has not opened yet.
    if is_trading_day(config.local_date(now)) {
        if let Some(wait) = config.time_until_window(now) {
            if let Ok(wait) = chrono::Duration::from_std(wait) {
                instants.push(now + wait);
            }
        }
    }
    let mut cursor = now;
    while instants.len() < count {
        match config.next_execution_after(cursor, end_time) {
            Some(next) => {
                instants.push(next);
                cursor = next;
            }
            None => break,
        }
    }

    if json {
        match serde_json::to_string_pretty(&instants) {
            Ok(out) => println!("{out}"),
            Err(error) => {
                eprintln!("failed to serialize preview: {error}");
                return ExitCode::FAILURE;
            }
        }
    } else if instants.is_empty() {
        println!("no execution windows before the lifetime ends");
    } else {
        for instant in &instants {
            println!("{}", instant.with_timezone(&config.timezone()));
        }
    }

    ExitCode::SUCCESS
}
