#[tokio::main(flavor = "current_thread")]
async fn main() {
    let code = smp_cli::run(std::env::args_os()).await;
    std::process::exit(code.code());
}
