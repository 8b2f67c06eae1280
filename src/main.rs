//! Command-line entry point for the veilfs binary.

use clap::Parser;

use veilfs::error::GatewayError;

fn main() {
    let cli = veilfs::cli::Cli::parse();
    cli.init_logging();

    if let Err(err) = veilfs::run(cli) {
        let mut exit_code = 1;
        for cause in err.chain() {
            if let Some(gateway) = cause.downcast_ref::<GatewayError>() {
                if gateway.is_request_error() {
                    exit_code = 2;
                } else if gateway.is_key_error() {
                    exit_code = 3;
                }
                break;
            }
        }
        eprintln!("veilfs: {err:#}");
        std::process::exit(exit_code);
    }
}
