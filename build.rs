use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protoc_path: PathBuf = protoc_bin_vendored::protoc_bin_path()?;
    unsafe {
        std::env::set_var("PROTOC", protoc_path);
    }

    let proto_root = "proto/riak";
    let protos = [
        "proto/riak/riak.proto",
        "proto/riak/riak_dt.proto",
        "proto/riak/riak_ts.proto",
        "proto/riak/riak_yokozuna.proto",
    ];

    for proto in protos {
        println!("cargo:rerun-if-changed={proto}");
    }

    // PBC is not gRPC: only the message types are generated.
    tonic_prost_build::configure()
        .build_client(false)
        .build_server(false)
        .compile_protos(&protos, &[proto_root])?;

    Ok(())
}
