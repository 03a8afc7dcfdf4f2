//! Single-connection ping/pong over a synchronously established
//! connection: the initiator resolves the peer address and a route to it,
//! the responder serves exactly one incoming request.

use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::Context as _;
use clap::{ArgGroup, Parser};

use rpp::{ctrl, Connection, PROTOCOL_PORT};

/// Payload the responder reads from the initiator.
const PING: &[u8] = b"aaa";
/// Payload the responder writes back to the initiator.
const PONG: &[u8] = b"bbb";

#[derive(Parser, Debug)]
#[command(name = "rpp", version, about)]
#[command(group = ArgGroup::new("role").required(true).args(["server", "client"]))]
struct Args {
    /// Run as the responder, serving exactly one initiator.
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
        ctrl::serve_one(addr, PONG).context("responder failed")?;
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
