pub const VERSION: &str = match option_env!("RIAK_CMD_BUILD_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
