use clap::Parser;
use scale_bridge::app::{self, Options};
use scale_bridge::logging;
use std::panic::{self, PanicHookInfo};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();
    logging::init(options.verbose);

    // Exit without dropping the runtime so a device that never acknowledged
    // the close cannot hold the process open.
    match app::run(options).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            tracing::error!(error = %why, "scale-bridge failed to start");
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
