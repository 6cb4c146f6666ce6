use std::process::ExitCode;

fn main() -> ExitCode {
    vanguard::uci::run()
}
