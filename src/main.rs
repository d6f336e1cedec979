use std::process::ExitCode;

fn main() -> ExitCode {
    pharmacy_locator_lib::run()
}
