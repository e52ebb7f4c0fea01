use std::process::ExitCode;

fn main() -> ExitCode {
    creditwatch_cli::run()
}
