fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut prost_config = prost_build::Config::new();
    prost_config.protoc_executable(protoc_bin_vendored::protoc_bin_path()?);
    tonic_build::configure()
        .compile_protos_with_config(prost_config, &["proto/event.proto"], &["proto"])?;
    Ok(())
}
