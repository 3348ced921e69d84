use std::process::ExitCode;

fn main() -> ExitCode {
    fieldrelay_cli::run()
}
