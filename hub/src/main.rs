fn main() -> std::process::ExitCode {
    vatacars_hub_lib::run()
}
