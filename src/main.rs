fn main() {
    env_logger::init();

    if let Err(error) = beambox::app::run() {
        log::error!("{error}");
        std::process::exit(1);
    }
}
