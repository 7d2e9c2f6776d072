fn main() {
    tonic_build::configure()
        .build_server(false)
        .compile(&["proto/worker.proto"], &["proto"])
        .expect("failed to compile worker.proto");
}
