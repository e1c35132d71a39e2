/// Generates the gRPC client and server code for `proto/changefeed.proto`.
///
/// A file descriptor set is written next to the generated code so the server
/// can expose the service over gRPC reflection.
///
/// # Panics
///
/// Panics if code generation fails.
///
/// # Output
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("changefeed");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("changefeed_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/changefeed.proto"], &["proto"])
        .unwrap();
}
