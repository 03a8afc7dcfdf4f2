//! Single-connection ping/pong with endpoint creation from address
//! information: both roles resolve the peer through `rdma_getaddrinfo`
//! instead of a pre-parsed socket address.

use anyhow::Context as _;
use clap::{ArgGroup, Parser};

use rpp::{ctrl, Connection, PROTOCOL_PORT};

/// Payload the responder reads from the initiator.
const PING: &[u8] = b"aaa";
/// Payload the responder writes back to the initiator.
const PONG: &[u8] = b"bbb";

#[derive(Parser, Debug)]
#[command(name = "rpp_ep", version, about)]
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

    /// Responder address or host name.
    addr: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let service = PROTOCOL_PORT.to_string();
    if args.server {
        ctrl::serve_one_addrinfo(&args.addr, &service, PONG).context("responder failed")?;
    } else {
        let mut conn = Connection::connect_addrinfo(&args.addr, &service)
            .context("failed to establish connection")?;
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
