//! Exercises `vpncore-tunnel` against a real TCP gateway with a stub local
//! interface — useful for manual smoke-testing the transport engine without
//! a platform TUN driver. Not part of the transport-engine core itself.

mod exitcode;
mod nulltun;

use std::io::Write;
use std::net::Ipv4Addr;
use std::time::Duration;

use clap::{Arg, ArgMatches, Command};
use tracing::{error, info};

use vpncore_framing::LengthPrefixedFramer;
use vpncore_ppp::PppEngine;
use vpncore_transport::{StreamTransport, TransportManager};
use vpncore_tunnel::{Dialect, Secret, Session, Settings, TunnelConfig, TunnelDriver};

use nulltun::NullTun;

fn make_help() -> String {
    r###"vpncore-demo

Usage: vpncore-demo [-...] <command> [command args]

Global Options:

  -v                              Verbose logging (debug level)

Commands:

  help                            Show this help
  version                         Print version (of this binary)
  connect <host> <port>           Connect, negotiate PPP, relay packets until closed
"###
    .to_string()
}

fn print_help() {
    let h = make_help();
    let _ = std::io::stdout().write_all(h.as_bytes());
}

struct Flags {
    verbose: bool,
}

fn demo_config() -> TunnelConfig {
    TunnelConfig {
        addr_v4: Some(Ipv4Addr::new(10, 8, 0, 2)),
        netmask_v4: Some(Ipv4Addr::new(255, 255, 255, 0)),
        addr_v6: None,
        prefix_len_v6: None,
        dns_servers: vec![],
        search_domains: vec![],
        split_includes: vec![],
        idle_timeout_secs: 1800,
        auth_expiration_unix: None,
        mtu: 1400,
        dpd_interval_secs: 30,
        datagram_crypto: None,
    }
}

async fn cmd_connect(host: &str, port: u16) -> i32 {
    let addr = format!("{host}:{port}");
    let stream = match tokio::net::TcpStream::connect(&addr).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, %addr, "failed to connect to gateway");
            return exitcode::ERR_IOERR;
        }
    };

    let config = demo_config();
    let settings = Settings::default();
    let framer = LengthPrefixedFramer::new(vec![0x50, 0x50], config.mtu as usize);
    let transport = StreamTransport::new(stream, framer.clone());
    let mut manager = TransportManager::with_config(transport, settings.manager_config());

    if let Err(e) = manager.connect(b"CONNECT vpncore-demo\r\n\r\n").await {
        error!(error = %e, "tunnel-start request failed");
        return exitcode::ERR_IOERR;
    }
    manager.enter_running();

    let engine = PppEngine::new(
        config.mtu,
        config.addr_v4.unwrap_or(Ipv4Addr::UNSPECIFIED),
        config.dns_servers.iter().find_map(|a| if let std::net::IpAddr::V4(v4) = a { Some(*v4) } else { None }),
        config.addr_v6.is_some(),
        settings.max_configure,
        Duration::from_secs(settings.restart_timer_secs),
        Duration::from_secs(settings.terminate_timeout_secs),
        config.dpd_interval(),
        settings.dpd_fail_count,
    );

    let client_hello_timeout = Duration::from_secs(settings.client_hello_timeout_secs);
    let session = match Session::new(manager, engine, framer, Dialect::DialectA, Secret(b"demo-cookie".to_vec()), config, settings) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "refusing to start session");
            return exitcode::ERR_IOERR;
        }
    };
    let mut driver = TunnelDriver::new(session, NullTun::default(), "/bin/true", host, "vpncore0");

    if let Err(e) = driver.start().await {
        error!(error = %e, "failed to start PPP negotiation");
        return exitcode::ERR_IOERR;
    }

    match tokio::net::UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => match socket.connect(&addr).await {
            Ok(()) => {
                if let Err(e) = driver.try_promote_datagram(socket, client_hello_timeout).await {
                    info!(error = %e, "datagram transport unavailable; staying on stream transport");
                }
            }
            Err(e) => info!(error = %e, "could not connect datagram socket; staying on stream transport"),
        },
        Err(e) => info!(error = %e, "could not bind datagram socket; staying on stream transport"),
    }

    info!("PPP negotiation started; relaying until terminated");
    match driver.run().await {
        Ok(()) => exitcode::OK,
        Err(e) => {
            error!(error = %e, "tunnel driver exited with error");
            exitcode::ERR_IOERR
        }
    }
}

async fn async_main(flags: Flags, global_args: ArgMatches) -> i32 {
    let level = if flags.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match global_args.subcommand() {
        Some(("help", _)) => {
            print_help();
            exitcode::OK
        }
        Some(("version", _)) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            exitcode::OK
        }
        Some(("connect", cmd_args)) => {
            let host = cmd_args.value_of("host").unwrap();
            let port: u16 = cmd_args.value_of_t("port").unwrap_or(443);
            cmd_connect(host, port).await
        }
        _ => {
            eprintln!("Invalid command line. Use 'help' for help.");
            exitcode::ERR_USAGE
        }
    }
}

fn main() {
    let global_args = Command::new("vpncore-demo")
        .arg(Arg::new("verbose").short('v'))
        .subcommand_required(true)
        .subcommand(Command::new("help"))
        .subcommand(Command::new("version"))
        .subcommand(Command::new("connect").arg(Arg::new("host").index(1).required(true)).arg(Arg::new("port").index(2).required(true)))
        .override_help(make_help().as_str())
        .disable_help_flag(true)
        .try_get_matches_from(std::env::args())
        .unwrap_or_else(|e| {
            if e.kind() == clap::ErrorKind::DisplayHelp || e.kind() == clap::ErrorKind::MissingSubcommand {
                print_help();
                std::process::exit(exitcode::OK);
            } else {
                eprintln!("Invalid command line. Use 'help' for help.");
                std::process::exit(exitcode::ERR_USAGE);
            }
        });

    let flags = Flags { verbose: global_args.is_present("verbose") };

    std::process::exit(tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap().block_on(async_main(flags, global_args)));
}
