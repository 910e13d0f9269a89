fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc_path) = protoc_bin_vendored::protoc_bin_path() {
            std::env::set_var("PROTOC", protoc_path);
        }
    }

    // Tell Cargo to rerun this build script if the proto files change
    println!("cargo:rerun-if-changed=src/proto/gnmi.proto");
    println!("cargo:rerun-if-changed=src/proto/telemetry.proto");
    println!("cargo:rerun-if-changed=src/proto/mdt_dialin.proto");

    // Configure the protobuf build; only client stubs are needed
    tonic_build::configure()
        .build_server(false)
        .compile(
            &[
                "src/proto/gnmi.proto",
                "src/proto/telemetry.proto",
                "src/proto/mdt_dialin.proto",
            ],
            &["src/proto"],
        )?;

    Ok(())
}
