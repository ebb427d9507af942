use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

use riak_commands::{
    Client, TcpTransport,
    command::{CommandBuilder, CommandKind, Operation, completion_channel},
    commands::{
        FetchCounter, FetchHll, FetchMap, FetchSchema, FetchSet, MapOperation, TsDelete,
        UpdateCounter, UpdateGSet, UpdateHll, UpdateMap, UpdateSet,
        crdt::{DataType, DtFetchBuilder, DtUpdateBuilder, UpdatePayload},
    },
    config::{
        Cli, Command, Config, ContextFetchArgs, CounterCommand, FetchArgs, GSetCommand,
        HllCommand, MapCommand, MapUpdateArgs, SchemaCommand, SetCommand, TsCommand, UpdateArgs,
    },
    render,
    validate::{GENERIC_OPTIONS, Requirement},
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let client = Runner::new(&cli.config);

    match cli.command {
        Command::Options(args) => print_options(args.kind),
        Command::Schema(SchemaCommand::Fetch { name }) => {
            let mut builder = FetchSchema::builder();
            if let Some(name) = name {
                builder = builder.with_schema_name(name);
            }
            client.run(builder).await
        }
        Command::Ts(TsCommand::Delete(args)) => {
            let mut builder = TsDelete::builder().with_key(args.key);
            if let Some(table) = args.table {
                builder = builder.with_table(table);
            }
            if let Some(timeout) = args.timeout_ms {
                builder = builder.with_timeout(timeout);
            }
            client.run(builder).await
        }
        Command::Counter(CounterCommand::Fetch(args)) => {
            client.run(fetch_builder(FetchCounter::builder(), args)).await
        }
        Command::Counter(CounterCommand::Update(args)) => {
            let mut builder = update_builder(UpdateCounter::builder(), args.update);
            if let Some(increment) = args.increment {
                builder = builder.with_increment(increment);
            }
            client.run(builder).await
        }
        Command::Set(SetCommand::Fetch(args)) => {
            let ContextFetchArgs {
                fetch,
                include_context,
            } = args;
            let mut builder = fetch_builder(FetchSet::builder(), fetch);
            if let Some(include) = include_context {
                builder = builder.with_include_context(include);
            }
            client.run(builder).await
        }
        Command::Set(SetCommand::Update(args)) => {
            let mut builder = update_builder(UpdateSet::builder(), args.update)
                .with_additions(args.additions)
                .with_removals(args.removals);
            if let Some(context) = args.context {
                builder = builder.with_context(parse_context(&context)?);
            }
            client.run(builder).await
        }
        Command::Gset(GSetCommand::Update(args)) => {
            let builder =
                update_builder(UpdateGSet::builder(), args.update).with_additions(args.additions);
            client.run(builder).await
        }
        Command::Hll(HllCommand::Fetch(args)) => {
            client.run(fetch_builder(FetchHll::builder(), args)).await
        }
        Command::Hll(HllCommand::Update(args)) => {
            let builder =
                update_builder(UpdateHll::builder(), args.update).with_additions(args.additions);
            client.run(builder).await
        }
        Command::Map(MapCommand::Fetch(args)) => {
            let ContextFetchArgs {
                fetch,
                include_context,
            } = args;
            let mut builder = fetch_builder(FetchMap::builder(), fetch);
            if let Some(include) = include_context {
                builder = builder.with_include_context(include);
            }
            client.run(builder).await
        }
        Command::Map(MapCommand::Update(args)) => {
            let context = args.context.as_deref().map(parse_context).transpose()?;
            let op = map_operation(&args);
            let mut builder = update_builder(UpdateMap::builder(), args.update).with_map_op(op);
            if let Some(context) = context {
                builder = builder.with_context(context);
            }
            client.run(builder).await
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

struct Runner {
    client: Client,
    max_retries: Option<u32>,
}

impl Runner {
    fn new(config: &Config) -> Self {
        let transport = Arc::new(TcpTransport::new(config.transport()));
        Self {
            client: Client::new(transport).with_retry_policy(config.retry_policy()),
            max_retries: config.max_retries,
        }
    }

    /// Validates before anything touches the network; the transport only
    /// connects on the first send.
    async fn run<B>(&self, builder: B) -> Result<()>
    where
        B: CommandBuilder,
        <B::Operation as Operation>::Output: Serialize,
    {
        let (callback, done) = completion_channel::<<B::Operation as Operation>::Output>();
        let mut builder = builder.with_callback(callback);
        if let Some(max_retries) = self.max_retries {
            builder = builder.with_max_retries(max_retries);
        }
        let command = builder.build()?;
        debug!(kind = %command.kind(), "built command");

        let state = self.client.execute(command).await;
        debug!(?state, "command finished");

        let output = done.await.context("command completed without a result")??;
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

fn fetch_builder<T: DataType>(builder: DtFetchBuilder<T>, args: FetchArgs) -> DtFetchBuilder<T> {
    let mut builder = builder;
    if let Some(bucket_type) = args.location.bucket_type {
        builder = builder.with_bucket_type(bucket_type);
    }
    if let Some(bucket) = args.location.bucket {
        builder = builder.with_bucket(bucket);
    }
    if let Some(key) = args.location.key {
        builder = builder.with_key(key);
    }
    if let Some(r) = args.r {
        builder = builder.with_r(r);
    }
    if let Some(pr) = args.pr {
        builder = builder.with_pr(pr);
    }
    if let Some(notfound_ok) = args.notfound_ok {
        builder = builder.with_notfound_ok(notfound_ok);
    }
    if let Some(basic_quorum) = args.basic_quorum {
        builder = builder.with_use_basic_quorum(basic_quorum);
    }
    if let Some(timeout) = args.timeout_ms {
        builder = builder.with_timeout(timeout);
    }
    builder
}

fn update_builder<P: UpdatePayload>(
    builder: DtUpdateBuilder<P>,
    args: UpdateArgs,
) -> DtUpdateBuilder<P> {
    let mut builder = builder;
    if let Some(bucket_type) = args.location.bucket_type {
        builder = builder.with_bucket_type(bucket_type);
    }
    if let Some(bucket) = args.location.bucket {
        builder = builder.with_bucket(bucket);
    }
    if let Some(key) = args.location.key {
        builder = builder.with_key(key);
    }
    if let Some(w) = args.w {
        builder = builder.with_w(w);
    }
    if let Some(dw) = args.dw {
        builder = builder.with_dw(dw);
    }
    if let Some(pw) = args.pw {
        builder = builder.with_pw(pw);
    }
    if let Some(return_body) = args.return_body {
        builder = builder.with_return_body(return_body);
    }
    if let Some(timeout) = args.timeout_ms {
        builder = builder.with_timeout(timeout);
    }
    builder
}

fn parse_context(text: &str) -> Result<Vec<u8>> {
    render::parse_bytes(text).context("invalid --context")
}

/// Resolves `a.b.c` to field `c` of nested map `a.b`.
fn nested<'a, 'p>(root: &'a mut MapOperation, path: &'p str) -> (&'a mut MapOperation, &'p str) {
    match path.rsplit_once('.') {
        Some((parents, leaf)) => {
            let mut op = root;
            for name in parents.split('.') {
                op = op.map(name);
            }
            (op, leaf)
        }
        None => (root, path),
    }
}

fn map_operation(args: &MapUpdateArgs) -> MapOperation {
    let mut root = MapOperation::new();
    for (path, increment) in &args.counters {
        let (op, name) = nested(&mut root, path);
        op.increment_counter(name, *increment);
    }
    for (path, value) in &args.set_additions {
        let (op, name) = nested(&mut root, path);
        op.add_to_set(name, value.as_str());
    }
    for (path, value) in &args.set_removals {
        let (op, name) = nested(&mut root, path);
        op.remove_from_set(name, value.as_str());
    }
    for (path, value) in &args.registers {
        let (op, name) = nested(&mut root, path);
        op.set_register(name, value.as_str());
    }
    for (path, enabled) in &args.flags {
        let (op, name) = nested(&mut root, path);
        op.set_flag(name, *enabled);
    }
    for (kind, path) in &args.removed_fields {
        let (op, name) = nested(&mut root, path);
        op.remove(*kind, name);
    }
    root
}

fn print_options(kind: CommandKind) -> Result<()> {
    let options: Vec<_> = kind
        .options()
        .iter()
        .chain(GENERIC_OPTIONS)
        .map(|option| {
            let (requirement, default) = match option.requirement {
                Requirement::Required => ("required", None),
                Requirement::Optional => ("optional", None),
                Requirement::Default(default) => ("defaulted", Some(default)),
            };
            serde_json::json!({
                "name": option.name,
                "requirement": requirement,
                "default": default,
            })
        })
        .collect();
    let out = serde_json::json!({
        "kind": kind.name(),
        "default_retries": kind.default_retries(),
        "options": options,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
