mod client;
mod payload;
mod source;
mod state;

use std::net::{SocketAddr, ToSocketAddrs};
use std::process;
use std::thread;

use detlink_proto::DeviceId;
use detlink_util::config;

use crate::client::Detector;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let cfg = match config::parse_client_config(args) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };

    let log = match detlink_util::logging::init(cfg.log_level, cfg.log_file.as_deref()) {
        Ok(log) => log,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };
    slog::info!(log, "starting detlink-client"; "server" => &cfg.server, "port" => cfg.port, "device_serial" => cfg.device_serial);

    let running = detlink_util::shutdown::install();

    let server_addr: SocketAddr = match (cfg.server.as_str(), cfg.port).to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => {
                slog::error!(log, "server address resolved to no candidates"; "server" => &cfg.server);
                process::exit(1);
            }
        },
        Err(err) => {
            slog::error!(log, "failed to resolve server address"; "server" => &cfg.server, "error" => %err);
            process::exit(1);
        }
    };

    let identity = DeviceId::new(cfg.admin_code, cfg.device_type, cfg.device_serial);
    let source = Box::new(source::DemoSource::new(4));

    let mut detector = match Detector::new(server_addr, identity, source, log.clone()) {
        Ok(detector) => detector,
        Err(err) => {
            slog::error!(log, "failed to set up the client"; "error" => %err);
            process::exit(1);
        }
    };

    while detlink_util::shutdown::is_running(&running) {
        detector.tick();
        if !detector.state().is_connected() {
            thread::sleep(client::IDLE_SLEEP);
        }
    }

    slog::info!(log, "shutdown complete");
}
