fn main() -> std::process::ExitCode {
    trafficflow_lib::run()
}
