use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use ringflake::{
    CUSTOM_EPOCH, DEFAULT_BOOST_POWER, DEFAULT_PADDING_THRESHOLD_PERCENT, DEFAULT_PADDING_WORKERS,
    DEFAULT_SCHEDULE_INTERVAL_SECONDS, DEFAULT_SEQUENCE_BITS, DEFAULT_TIMESTAMP_BITS,
    DEFAULT_WORKER_ID_BITS, StaticWorkerIdAssigner, UidConfig,
};

use super::registry::{FileWorkerNodeAssigner, NodeType, default_host_name};
use super::service::config::{Clock, Generator};

/// Runtime configuration for the `ringflake-server` binary.
///
/// Every value can be given as a CLI flag or an environment variable (a
/// `.env` file is loaded first). The bit layout and epoch must stay identical
/// across every node sharing an id space.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ringflake-server",
    version,
    about = "An HTTP service handing out cached Snowflake-style UIDs"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Width of the seconds-since-epoch field.
    ///
    /// Environment variable: `TIMESTAMP_BITS`
    #[arg(long, env = "TIMESTAMP_BITS", default_value_t = DEFAULT_TIMESTAMP_BITS)]
    pub timestamp_bits: u32,

    /// Width of the worker id field. Bounds how many launches the registry can
    /// hand out ids for.
    ///
    /// Environment variable: `WORKER_ID_BITS`
    #[arg(long, env = "WORKER_ID_BITS", default_value_t = DEFAULT_WORKER_ID_BITS)]
    pub worker_id_bits: u32,

    /// Width of the per-second sequence field.
    ///
    /// Environment variable: `SEQUENCE_BITS`
    #[arg(long, env = "SEQUENCE_BITS", default_value_t = DEFAULT_SEQUENCE_BITS)]
    pub sequence_bits: u32,

    /// Zero point of the timestamp field, in Unix seconds.
    ///
    /// Environment variable: `EPOCH_SECONDS`
    #[arg(long, env = "EPOCH_SECONDS", default_value_t = CUSTOM_EPOCH.as_secs() as i64)]
    pub epoch_seconds: i64,

    /// The ring buffer holds `2^(SEQUENCE_BITS + BOOST_POWER)` ids.
    ///
    /// Environment variable: `BOOST_POWER`
    #[arg(long, env = "BOOST_POWER", default_value_t = DEFAULT_BOOST_POWER)]
    pub boost_power: u32,

    /// Refill once the ring buffer drops below this percent of its capacity.
    ///
    /// Environment variable: `PADDING_THRESHOLD_PERCENT`
    #[arg(long, env = "PADDING_THRESHOLD_PERCENT", default_value_t = DEFAULT_PADDING_THRESHOLD_PERCENT)]
    pub padding_threshold_percent: u32,

    /// Interval of the scheduled refill. `0` disables it.
    ///
    /// Environment variable: `SCHEDULE_INTERVAL_SECONDS`
    #[arg(long, env = "SCHEDULE_INTERVAL_SECONDS", default_value_t = DEFAULT_SCHEDULE_INTERVAL_SECONDS)]
    pub schedule_interval_seconds: u64,

    /// Threads running asynchronous refills.
    ///
    /// Environment variable: `PADDING_WORKERS`
    #[arg(long, env = "PADDING_WORKERS", default_value_t = DEFAULT_PADDING_WORKERS)]
    pub padding_workers: usize,

    /// JSON file registering every launch. Ignored when `WORKER_ID` is set.
    ///
    /// Environment variable: `WORKER_REGISTRY`
    #[arg(long, env = "WORKER_REGISTRY", default_value = "ringflake-workers.json")]
    pub worker_registry: PathBuf,

    /// Host name recorded in the registry. Defaults to `$HOSTNAME`.
    ///
    /// Environment variable: `WORKER_HOST`
    #[arg(long, env = "WORKER_HOST")]
    pub worker_host: Option<String>,

    /// Port recorded in the registry. Defaults to the listening port.
    ///
    /// Environment variable: `WORKER_PORT`
    #[arg(long, env = "WORKER_PORT")]
    pub worker_port: Option<u16>,

    /// Kind of node recorded in the registry.
    ///
    /// Environment variable: `WORKER_TYPE`
    #[arg(long, env = "WORKER_TYPE", value_enum, default_value_t = NodeType::Actual)]
    pub worker_type: NodeType,

    /// Fixed worker id, bypassing the registry. Only safe when ids are
    /// coordinated some other way.
    ///
    /// Padding issues ids for seconds ahead of the wall clock: at least
    /// `2^BOOST_POWER` seconds after startup, and further under sustained
    /// load. Restarting with the same id before the clock has caught up with
    /// the last issued second hands out duplicates, so wait that long or
    /// pick a new id.
    ///
    /// Environment variable: `WORKER_ID`
    #[arg(long, env = "WORKER_ID")]
    pub worker_id: Option<u64>,
}

/// Where the worker id comes from.
#[derive(Debug, Clone)]
pub enum WorkerSource {
    Static(StaticWorkerIdAssigner),
    Registry(FileWorkerNodeAssigner),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: SocketAddr,
    pub uid: UidConfig,
    pub worker: WorkerSource,
}

impl ServerConfig {
    /// Registers the worker and builds the generator, filling its ring buffer.
    pub fn build_generator(&self) -> anyhow::Result<Generator> {
        let generator = match &self.worker {
            WorkerSource::Static(assigner) => {
                tracing::warn!(
                    "Using static worker id {}. Ids run at least {}s ahead of the clock; do not \
                     restart with the same id before they are caught up",
                    assigner.0,
                    1u64 << self.uid.boost_power
                );
                Generator::new(&self.uid, assigner, Clock::default())
            }
            WorkerSource::Registry(assigner) => Generator::new(&self.uid, assigner, Clock::default()),
        }?;
        Ok(generator)
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let server_addr: SocketAddr = match args.server_addr.parse() {
            Ok(addr) => addr,
            Err(e) => bail!("SERVER_ADDR ({}) is not a socket address: {e}", args.server_addr),
        };

        let uid = UidConfig::default()
            .with_bits(args.timestamp_bits, args.worker_id_bits, args.sequence_bits)
            .with_epoch_seconds(args.epoch_seconds)
            .with_boost_power(args.boost_power)
            .with_padding_threshold_percent(args.padding_threshold_percent)
            .with_schedule_interval_seconds(args.schedule_interval_seconds)
            .with_padding_workers(args.padding_workers);
        if let Err(e) = uid.validate() {
            bail!("{e}");
        }

        let worker = match args.worker_id {
            Some(worker_id) => {
                let max_worker_id = uid.layout()?.max_worker_id();
                if worker_id > max_worker_id {
                    bail!(
                        "WORKER_ID ({}) exceeds the worker id space (max = {})",
                        worker_id,
                        max_worker_id
                    );
                }
                WorkerSource::Static(StaticWorkerIdAssigner(worker_id))
            }
            None => WorkerSource::Registry(FileWorkerNodeAssigner::new(
                args.worker_registry,
                args.worker_host.unwrap_or_else(default_host_name),
                args.worker_port.unwrap_or(server_addr.port()),
                args.worker_type,
            )),
        };

        Ok(Self {
            server_addr,
            uid,
            worker,
        })
    }
}
