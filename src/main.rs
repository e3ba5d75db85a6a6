fn main() -> std::process::ExitCode {
    skm_lib::run()
}
