use anyhow::bail;
use clap::{Args, Parser, Subcommand, ValueEnum};
use concord::{DEFAULT_KEY_PREFIX, LockConfig, LockMode, WaitPolicy};
use std::time::Duration;

/// Command line of the `concord` binary.
///
/// Every option can also come from the environment (or a `.env` file in the
/// working directory).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "concord",
    version,
    about = "Mint instance-tagged IDs and run commands under a Redis lock"
)]
pub struct CliArgs {
    /// Instance identity embedded in generated IDs.
    ///
    /// When unset, it is derived from the low two bytes of the host's IPv4
    /// address. Set it explicitly when several processes share a host.
    ///
    /// Environment variable: `INSTANCE_ID`
    #[arg(long, env = "INSTANCE_ID", global = true)]
    pub instance_id: Option<u32>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Print freshly generated IDs, one per line.
    Ids {
        /// How many IDs to print.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Use the decimal `YYMMDD...` layout instead of the bit-packed one.
        #[arg(long, default_value_t = false)]
        dated: bool,
    },

    /// Run a command while holding a Redis lock on a resource.
    Lock(LockArgs),

    /// Split an ID into its fields.
    Inspect {
        /// The ID to decompose.
        id: u64,

        /// Decode as a dated ID.
        #[arg(long, default_value_t = false)]
        dated: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct LockArgs {
    /// Name of the resource to lock.
    pub resource: String,

    /// Redis server arbitrating the lock.
    ///
    /// Environment variable: `REDIS_URL`
    #[arg(long, env = "REDIS_URL", default_value_t = String::from("redis://127.0.0.1:6379/"))]
    pub redis_url: String,

    /// Lease of the lock record, renewed every third of it while the command
    /// runs.
    ///
    /// Environment variable: `LOCK_LEASE_MS`
    #[arg(long, env = "LOCK_LEASE_MS", default_value_t = 60_000)]
    pub lease_ms: u64,

    /// Give up after waiting this long for the lock. Waits forever when
    /// unset.
    ///
    /// Environment variable: `LOCK_WAIT_MS`
    #[arg(long, env = "LOCK_WAIT_MS")]
    pub wait_ms: Option<u64>,

    /// Pause between acquisition attempts.
    ///
    /// Environment variable: `LOCK_POLL_MS`
    #[arg(long, env = "LOCK_POLL_MS", default_value_t = 100)]
    pub poll_ms: u64,

    /// Whether local contenders queue in-process before polling Redis.
    ///
    /// Environment variable: `LOCK_MODE`
    #[arg(long, env = "LOCK_MODE", value_enum, default_value_t = Mode::Pessimistic)]
    pub mode: Mode,

    /// Namespace of lock keys.
    ///
    /// Environment variable: `LOCK_KEY_PREFIX`
    #[arg(long, env = "LOCK_KEY_PREFIX", default_value_t = String::from(DEFAULT_KEY_PREFIX))]
    pub key_prefix: String,

    /// The command to run, after `--`.
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Pessimistic,
    Optimistic,
}

impl From<Mode> for LockMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Pessimistic => Self::Pessimistic,
            Mode::Optimistic => Self::Optimistic,
        }
    }
}

/// Validated settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub instance_id: Option<u32>,
    pub action: Action,
}

#[derive(Debug, Clone)]
pub enum Action {
    Ids { count: usize, dated: bool },
    Lock(LockJob),
    Inspect { id: u64, dated: bool },
}

#[derive(Debug, Clone)]
pub struct LockJob {
    pub redis_url: String,
    pub resource: String,
    pub lock: LockConfig,
    pub program: String,
    pub args: Vec<String>,
}

impl LockJob {
    /// How often the lease is renewed while the command runs.
    pub fn renew_every(&self) -> Duration {
        self.lock.lease / 3
    }
}

impl TryFrom<CliArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let action = match args.command {
            CliCommand::Ids { count, dated } => {
                if count == 0 {
                    bail!("--count must be greater than 0");
                }
                Action::Ids { count, dated }
            }
            CliCommand::Inspect { id, dated } => Action::Inspect { id, dated },
            CliCommand::Lock(lock) => Action::Lock(LockJob::try_from(lock)?),
        };

        Ok(Self {
            instance_id: args.instance_id,
            action,
        })
    }
}

impl TryFrom<LockArgs> for LockJob {
    type Error = anyhow::Error;

    fn try_from(args: LockArgs) -> Result<Self, Self::Error> {
        if args.resource.is_empty() {
            bail!("resource name must not be empty");
        }
        if args.lease_ms < 3 {
            bail!("LOCK_LEASE_MS ({}) must be at least 3", args.lease_ms);
        }
        if args.poll_ms == 0 {
            bail!("LOCK_POLL_MS must be greater than 0");
        }

        let mut command = args.command.into_iter();
        let Some(program) = command.next() else {
            bail!("no command given after `--`");
        };

        let wait = args.wait_ms.map_or(WaitPolicy::Forever, |ms| {
            WaitPolicy::Timeout(Duration::from_millis(ms))
        });
        let lock = LockConfig::default()
            .with_lease(Duration::from_millis(args.lease_ms))
            .with_wait(wait)
            .with_poll_interval(Duration::from_millis(args.poll_ms))
            .with_mode(args.mode.into())
            .with_key_prefix(args.key_prefix);

        Ok(Self {
            redis_url: args.redis_url,
            resource: args.resource,
            lock,
            program,
            args: command.collect(),
        })
    }
}
