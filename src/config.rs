use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    backoff::{BackoffConfig, RetryPolicy},
    command::CommandKind,
    commands::{MapFieldKind, TsCell},
    transport::TcpTransportConfig,
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "riak-cmd",
    about = "Run single commands against a Riak PBC node",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Search schemas.
    #[command(subcommand)]
    Schema(SchemaCommand),

    /// Time-series tables.
    #[command(subcommand)]
    Ts(TsCommand),

    #[command(subcommand)]
    Counter(CounterCommand),

    #[command(subcommand)]
    Set(SetCommand),

    /// Grow-only sets.
    #[command(subcommand)]
    Gset(GSetCommand),

    /// HyperLogLog cardinality estimators.
    #[command(subcommand)]
    Hll(HllCommand),

    #[command(subcommand)]
    Map(MapCommand),

    /// Print the options a command kind accepts.
    Options(OptionsArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum SchemaCommand {
    /// Fetch a schema; without NAME the server default is fetched.
    Fetch { name: Option<String> },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TsCommand {
    /// Delete one row by its full primary key.
    Delete(TsDeleteArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TsDeleteArgs {
    #[arg(long, value_name = "TABLE")]
    pub table: Option<String>,

    /// Key cell as s:<text>, i:<int>, t:<millis>, b:<bool> or d:<float>;
    /// repeat in key order.
    #[arg(long = "key", value_name = "CELL", allow_hyphen_values = true)]
    pub key: Vec<TsCell>,

    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u32>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CounterCommand {
    Fetch(FetchArgs),
    Update(CounterUpdateArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum SetCommand {
    Fetch(ContextFetchArgs),
    Update(SetUpdateArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum GSetCommand {
    Update(AddArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum HllCommand {
    Fetch(FetchArgs),
    Update(AddArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum MapCommand {
    Fetch(ContextFetchArgs),
    Update(MapUpdateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct Location {
    /// Defaults to the data type's conventional bucket type.
    #[arg(long = "bucket-type", value_name = "TYPE")]
    pub bucket_type: Option<String>,

    #[arg(long, value_name = "BUCKET")]
    pub bucket: Option<String>,

    /// Updates without a key get one generated by the server.
    #[arg(long, value_name = "KEY")]
    pub key: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub location: Location,

    #[arg(long)]
    pub r: Option<u32>,

    #[arg(long)]
    pub pr: Option<u32>,

    #[arg(long = "notfound-ok", value_name = "BOOL")]
    pub notfound_ok: Option<bool>,

    #[arg(long = "basic-quorum", value_name = "BOOL")]
    pub basic_quorum: Option<bool>,

    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct ContextFetchArgs {
    #[command(flatten)]
    pub fetch: FetchArgs,

    #[arg(long = "include-context", value_name = "BOOL")]
    pub include_context: Option<bool>,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub location: Location,

    #[arg(long)]
    pub w: Option<u32>,

    #[arg(long)]
    pub dw: Option<u32>,

    #[arg(long)]
    pub pw: Option<u32>,

    #[arg(long = "return-body", value_name = "BOOL")]
    pub return_body: Option<bool>,

    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct CounterUpdateArgs {
    #[command(flatten)]
    pub update: UpdateArgs,

    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub increment: Option<i64>,
}

#[derive(Args, Debug, Clone)]
pub struct SetUpdateArgs {
    #[command(flatten)]
    pub update: UpdateArgs,

    #[arg(long = "add", value_name = "VALUE")]
    pub additions: Vec<String>,

    #[arg(long = "remove", value_name = "VALUE")]
    pub removals: Vec<String>,

    /// Context from an earlier fetch, as printed by `fetch`.
    #[arg(long, value_name = "CONTEXT")]
    pub context: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[command(flatten)]
    pub update: UpdateArgs,

    #[arg(long = "add", value_name = "VALUE")]
    pub additions: Vec<String>,
}

/// Field names may be dotted to reach into nested maps: `address.city`.
#[derive(Args, Debug, Clone)]
pub struct MapUpdateArgs {
    #[command(flatten)]
    pub update: UpdateArgs,

    #[arg(long = "counter", value_name = "NAME=N", value_parser = parse_counter)]
    pub counters: Vec<(String, i64)>,

    #[arg(long = "register", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub registers: Vec<(String, String)>,

    #[arg(long = "flag", value_name = "NAME=BOOL", value_parser = parse_flag)]
    pub flags: Vec<(String, bool)>,

    #[arg(long = "add", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub set_additions: Vec<(String, String)>,

    #[arg(long = "remove", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub set_removals: Vec<(String, String)>,

    #[arg(long = "remove-field", value_name = "KIND:NAME", value_parser = parse_field)]
    pub removed_fields: Vec<(MapFieldKind, String)>,

    #[arg(long, value_name = "CONTEXT")]
    pub context: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct OptionsArgs {
    /// Command kind, e.g. `ts_delete` or `update_map`.
    pub kind: CommandKind,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = "RIAK_ADDR",
        value_name = "ADDR",
        default_value = "127.0.0.1:8087"
    )]
    pub addr: SocketAddr,

    #[arg(
        long = "connect-timeout-ms",
        global = true,
        env = "RIAK_CONNECT_TIMEOUT_MS",
        value_name = "MS",
        default_value_t = 3_000,
        value_parser = clap::value_parser!(u64).range(1..=60_000)
    )]
    pub connect_timeout_ms: u64,

    #[arg(
        long = "request-timeout-ms",
        global = true,
        env = "RIAK_REQUEST_TIMEOUT_MS",
        value_name = "MS",
        default_value_t = 10_000,
        value_parser = clap::value_parser!(u64).range(1..=600_000)
    )]
    pub request_timeout_ms: u64,

    /// Overrides every command's default retry budget.
    #[arg(
        long = "max-retries",
        global = true,
        env = "RIAK_MAX_RETRIES",
        value_name = "N",
        value_parser = clap::value_parser!(u32).range(0..=10)
    )]
    pub max_retries: Option<u32>,

    #[arg(
        long = "retry-base-ms",
        global = true,
        env = "RIAK_RETRY_BASE_MS",
        value_name = "MS",
        default_value_t = 50,
        value_parser = clap::value_parser!(u64).range(0..=10_000)
    )]
    pub retry_base_ms: u64,

    #[arg(
        long = "retry-cap-ms",
        global = true,
        env = "RIAK_RETRY_CAP_MS",
        value_name = "MS",
        default_value_t = 2_000,
        value_parser = clap::value_parser!(u64).range(0..=60_000)
    )]
    pub retry_cap_ms: u64,
}

impl Config {
    pub fn transport(&self) -> TcpTransportConfig {
        TcpTransportConfig {
            addr: self.addr,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(BackoffConfig {
            base: Duration::from_millis(self.retry_base_ms),
            cap: Duration::from_millis(self.retry_cap_ms),
            ..BackoffConfig::default()
        })
    }
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got {s:?}")),
    }
}

fn parse_counter(s: &str) -> Result<(String, i64), String> {
    let (name, value) = parse_assignment(s)?;
    let value = value
        .parse()
        .map_err(|e| format!("counter {name:?}: {e}"))?;
    Ok((name, value))
}

fn parse_flag(s: &str) -> Result<(String, bool), String> {
    let (name, value) = parse_assignment(s)?;
    let value = value.parse().map_err(|e| format!("flag {name:?}: {e}"))?;
    Ok((name, value))
}

fn parse_field(s: &str) -> Result<(MapFieldKind, String), String> {
    let Some((kind, name)) = s.split_once(':') else {
        return Err(format!("expected KIND:NAME, got {s:?}"));
    };
    let kind = kind.parse::<MapFieldKind>().map_err(|e| e.to_string())?;
    if name.is_empty() {
        return Err(format!("missing field name in {s:?}"));
    }
    Ok((kind, name.to_string()))
}
