//! Multi-client ping/pong responder: an event-driven accept loop hands
//! each incoming connection to a detached worker thread, until SIGINT.
//! The initiator side is identical to `rpp`'s.

use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::Context as _;
use clap::{ArgGroup, Parser};

use rpp::{ctrl, Connection, PROTOCOL_PORT};

/// Payload the responder reads from each initiator.
const PING: &[u8] = b"aaa";
/// Payload the responder writes back to each initiator.
const PONG: &[u8] = b"bbb";

#[derive(Parser, Debug)]
#[command(name = "rpp_multi", version, about)]
#[command(group = ArgGroup::new("role").required(true).args(["server", "client"]))]
struct Args {
    /// Run as the responder, accepting connections until interrupted.
    #[arg(short = 's')]
    server: bool,

    /// Run as the initiator.
    #[arg(short = 'c')]
    client: bool,

    /// Verbose protocol tracing.
    #[arg(short = 'd')]
    debug: bool,

    /// Responder IPv4 address (bind address with `-s`, peer with `-c`).
    addr: Ipv4Addr,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let addr = SocketAddrV4::new(args.addr, PROTOCOL_PORT);
    if args.server {
        let shutdown = ctrl::Shutdown::new();
        shutdown
            .on_sigint()
            .context("failed to install SIGINT handler")?;
        let acceptor = ctrl::Acceptor::bind(addr, shutdown).context("failed to bind acceptor")?;
        acceptor
            .run(&ctrl::ThreadPerConnection::new(PONG))
            .context("acceptor failed")?;
    } else {
        let mut conn = Connection::connect(addr).context("failed to establish connection")?;
        conn.run_initiator(PING).context("exchange failed")?;
    }

    println!("done");
    Ok(())
}

fn init_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}
