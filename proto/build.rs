use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()?;
        // build scripts run single threaded, nothing else reads the environment concurrently
        unsafe { std::env::set_var("PROTOC", protoc) };
    }
    let protos = [
        "client_master.proto",
        "chunkserver_master.proto",
        "client_chunkserver.proto",
        "master_chunkserver.proto",
    ];
    for proto in protos {
        println!("cargo:rerun-if-changed={proto}");
    }
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&protos, &["."])?;
    Ok(())
}
