#[tokio::main]
async fn main() {
    labelsnap_cli::init_tracing();

    if let Err(error) = labelsnap_cli::run(std::env::args_os()).await {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
