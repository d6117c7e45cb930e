// src/main.rs

use childspawn::{cli, logging, run};

fn main() {
    let code = match run_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("childspawn error: {err:?}");
            1
        }
    };
    std::process::exit(code);
}

fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(args));
    // A stdin forwarder may still be blocked reading the terminal.
    runtime.shutdown_background();
    result
}
