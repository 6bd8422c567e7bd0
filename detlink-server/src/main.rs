mod dispatch;
mod server;
mod slot;

use std::net::SocketAddr;
use std::process;

use detlink_util::config;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let cfg = match config::parse_server_config(args) {
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
    slog::info!(log, "starting detlink-server"; "port" => cfg.port, "device_serial" => cfg.device_serial);

    let running = detlink_util::shutdown::install();

    let addr: SocketAddr = match format!("0.0.0.0:{}", cfg.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            slog::error!(log, "invalid bind address"; "error" => %err);
            process::exit(1);
        }
    };

    let identity = server::own_identity(cfg.admin_code, cfg.device_serial);
    let mut srv = match server::Server::bind(addr, identity, log.clone()) {
        Ok(srv) => srv,
        Err(err) => {
            slog::error!(log, "failed to bind listener"; "addr" => %addr, "error" => %err);
            process::exit(1);
        }
    };

    if let Err(err) = srv.run(&running) {
        slog::error!(log, "server loop exited with an error"; "error" => %err);
        process::exit(1);
    }

    slog::info!(log, "shutdown complete");
}
