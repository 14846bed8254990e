use std::process::ExitCode;

fn main() -> ExitCode {
    ksm_cli::run()
}
