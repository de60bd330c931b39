use std::process::ExitCode;

fn main() -> ExitCode {
    eapproval_cli::run()
}
