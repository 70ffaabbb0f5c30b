use anyhow::bail;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use core::time::Duration;
use tally::{
    AllocatorPolicy, Backoff, Calendar, CodeContext, DocDirection, DocumentSettings,
    NumberingConfig, TenantId,
};

/// Command-line interface of the `tally` binary.
///
/// Connection and policy settings are read from flags, the environment or a
/// `.env` file, in that order of precedence.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tally",
    version,
    about = "Issue and inspect tenant-scoped sequence numbers stored in PostgreSQL"
)]
pub struct CliArgs {
    /// PostgreSQL connection string.
    ///
    /// Environment variable: `DATABASE_URL`
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// How long to wait for a contended counter row, in milliseconds.
    ///
    /// Environment variable: `TALLY_LOCK_TIMEOUT_MS`
    #[arg(long, env = "TALLY_LOCK_TIMEOUT_MS", default_value_t = 3_000)]
    pub lock_timeout_ms: u64,

    /// Attempts made when creating a new counter races another caller.
    ///
    /// Environment variable: `TALLY_MAX_ATTEMPTS`
    #[arg(long, env = "TALLY_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Upper bound on pooled database connections.
    ///
    /// Environment variable: `TALLY_MAX_CONNECTIONS`
    #[arg(long, env = "TALLY_MAX_CONNECTIONS", default_value_t = 4)]
    pub max_connections: u32,

    /// Log output format. Logs are written to stderr.
    ///
    /// Environment variable: `TALLY_LOG_FORMAT`
    #[arg(long, env = "TALLY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: CommandArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CommandArgs {
    /// Issue the next code. Every successful call consumes a number.
    Allocate {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Show the last issued number and the likely next code, without
    /// consuming anything.
    Peek {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Create the counter table if it does not exist.
    Migrate,
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Organization the counter belongs to.
    ///
    /// Environment variable: `TALLY_TENANT`
    #[arg(long, env = "TALLY_TENANT")]
    pub tenant: String,

    #[command(subcommand)]
    pub family: FamilyArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FamilyArgs {
    /// Student registration code, e.g. `ST-25-000007`.
    Student {
        #[arg(long, default_value_t = Calendar::Gregorian)]
        calendar: Calendar,
    },
    /// Staff code, e.g. `STF-25-000007`.
    Staff {
        #[arg(long, default_value_t = Calendar::Gregorian)]
        calendar: Calendar,
    },
    /// Admission number, e.g. `ADM-25-000007`.
    Admission {
        #[arg(long, default_value_t = Calendar::Gregorian)]
        calendar: Calendar,
    },
    /// Course admission number, e.g. `CS-PHY-04-001`.
    Course {
        #[arg(long)]
        school: String,

        /// Course name. The category code is derived from it.
        #[arg(long)]
        course: String,

        /// Course start date (YYYY-MM-DD). Picks the period; defaults to
        /// today.
        #[arg(long)]
        start_date: Option<NaiveDate>,

        #[arg(long, default_value_t = Calendar::Jalali)]
        calendar: Calendar,
    },
    /// Incoming or outgoing document number, e.g. `OUT/2025/00156`.
    Document {
        #[arg(long)]
        direction: DocDirection,

        #[arg(long)]
        school: Option<String>,

        /// Document prefix configured for this organization or school.
        #[arg(long)]
        prefix: Option<String>,

        /// Period override, e.g. an academic-year key.
        #[arg(long)]
        period: Option<String>,

        #[arg(long, default_value_t = Calendar::Gregorian)]
        year_mode: Calendar,

        /// Keep one counter across years instead of restarting yearly.
        #[arg(long, default_value_t = false)]
        no_reset_yearly: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Only the formatted code.
    Text,
    /// The whole allocation as JSON.
    Json,
}

/// Validated settings the binary runs with.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub database_url: String,
    pub policy: AllocatorPolicy,
    pub max_connections: u32,
    pub log_format: LogFormat,
    pub command: Command,
}

#[derive(Debug, Clone)]
pub enum Command {
    Allocate { target: Target, output: OutputFormat },
    Peek { target: Target },
    Migrate,
}

/// A resolved counter: who, what, and with which numbering settings.
#[derive(Debug, Clone)]
pub struct Target {
    pub tenant: TenantId,
    pub context: CodeContext,
    pub numbering: NumberingConfig,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.lock_timeout_ms == 0 {
            bail!("TALLY_LOCK_TIMEOUT_MS must be greater than 0");
        }
        if args.max_attempts == 0 {
            bail!("TALLY_MAX_ATTEMPTS must be greater than 0");
        }
        if args.max_connections == 0 {
            bail!("TALLY_MAX_CONNECTIONS must be greater than 0");
        }

        let policy = AllocatorPolicy::default()
            .with_lock_timeout(Duration::from_millis(args.lock_timeout_ms))
            .with_max_attempts(args.max_attempts)
            .with_backoff(Backoff::Sleep(Duration::from_millis(5)));
        policy.validate()?;

        let command = match args.command {
            CommandArgs::Allocate { target, output } => Command::Allocate {
                target: Target::try_from(target)?,
                output,
            },
            CommandArgs::Peek { target } => Command::Peek {
                target: Target::try_from(target)?,
            },
            CommandArgs::Migrate => Command::Migrate,
        };

        Ok(Self {
            database_url: args.database_url,
            policy,
            max_connections: args.max_connections,
            log_format: args.log_format,
            command,
        })
    }
}

impl TryFrom<TargetArgs> for Target {
    type Error = anyhow::Error;

    fn try_from(args: TargetArgs) -> Result<Self, Self::Error> {
        let tenant = TenantId::new(args.tenant)?;
        let numbering = NumberingConfig::default();

        let (context, numbering) = match args.family {
            FamilyArgs::Student { calendar } => (
                CodeContext::Student,
                numbering.with_registration_calendar(calendar),
            ),
            FamilyArgs::Staff { calendar } => (
                CodeContext::Staff,
                numbering.with_registration_calendar(calendar),
            ),
            FamilyArgs::Admission { calendar } => (
                CodeContext::Admission,
                numbering.with_registration_calendar(calendar),
            ),
            FamilyArgs::Course {
                school,
                course,
                start_date,
                calendar,
            } => (
                CodeContext::CourseAdmission {
                    school_id: school,
                    course_name: course,
                    start_date,
                },
                numbering.with_course_calendar(calendar),
            ),
            FamilyArgs::Document {
                direction,
                school,
                prefix,
                period,
                year_mode,
                no_reset_yearly,
            } => {
                let mut documents = DocumentSettings::default()
                    .with_year_mode(year_mode)
                    .with_reset_yearly(!no_reset_yearly);
                if let Some(prefix) = prefix {
                    documents = documents.with_prefix(direction, prefix);
                }
                (
                    CodeContext::Document {
                        school_id: school,
                        direction,
                        period,
                    },
                    numbering.with_documents(documents),
                )
            }
        };

        Ok(Self {
            tenant,
            context,
            numbering,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<CliConfig> {
        let mut argv = vec!["tally", "--database-url", "postgres://localhost/tally"];
        argv.extend_from_slice(args);
        CliConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn parses_course_allocation() {
        let config = parse(&[
            "allocate",
            "--tenant",
            "org-1",
            "course",
            "--school",
            "s1",
            "--course",
            "Physics Lab",
            "--start-date",
            "2025-03-21",
        ])
        .unwrap();

        assert_eq!(config.policy.lock_timeout, Duration::from_secs(3));
        assert_eq!(config.policy.max_attempts, 3);
        let Command::Allocate { target, output } = config.command else {
            panic!("expected allocate");
        };
        assert_eq!(output, OutputFormat::Text);
        assert_eq!(target.tenant.as_str(), "org-1");
        assert_eq!(target.numbering.course_calendar, Calendar::Jalali);
        assert_eq!(
            target.context,
            CodeContext::CourseAdmission {
                school_id: "s1".into(),
                course_name: "Physics Lab".into(),
                start_date: NaiveDate::from_ymd_opt(2025, 3, 21),
            }
        );
    }

    #[test]
    fn parses_document_settings() {
        let config = parse(&[
            "peek",
            "--tenant",
            "org-1",
            "document",
            "--direction",
            "out",
            "--prefix",
            "LTR",
            "--year-mode",
            "shamsi",
            "--no-reset-yearly",
        ])
        .unwrap();

        let Command::Peek { target } = config.command else {
            panic!("expected peek");
        };
        let documents = &target.numbering.documents;
        assert_eq!(documents.prefix_for(DocDirection::Outgoing), "LTR");
        assert_eq!(documents.year_mode, Calendar::Jalali);
        assert!(!documents.reset_yearly);
    }

    #[test]
    fn rejects_degenerate_settings() {
        assert!(parse(&["--lock-timeout-ms", "0", "migrate"]).is_err());
        assert!(parse(&["--max-attempts", "0", "migrate"]).is_err());
        assert!(parse(&["--max-connections", "0", "migrate"]).is_err());
        assert!(parse(&["allocate", "--tenant", "  ", "student"]).is_err());
        assert!(parse(&["migrate"]).is_ok());
    }
}
