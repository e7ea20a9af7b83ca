use std::process::ExitCode;

fn main() -> ExitCode {
    tachyon_cli::init_logging();
    tachyon_cli::run_cli()
}
