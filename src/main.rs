use std::process::ExitCode;

fn main() -> ExitCode {
    connect_lib::run()
}
