//! The `chatroom-server` binary: wires `chatroom::State` into
//! `paxos::Config` and runs one cluster member over TCP, with a `fern`
//! log dispatcher and a `clap`-derived CLI, one struct per binary.

use std::net::SocketAddr;

use clap::Parser;

#[derive(Parser)]
#[command(name = "chatroom-server")]
struct Opt {
    /// Unique server ID (index into the cluster's address list).
    #[arg(short, long)]
    id: usize,

    /// Base TCP port; member `i` listens for peer traffic on `base_port + i`.
    #[arg(short, long = "base-port", default_value_t = 20000)]
    base_port: u16,

    /// Port this member accepts client requests on.
    #[arg(short, long)]
    port: u16,

    /// Total number of servers in the cluster.
    #[arg(short, long)]
    count: usize,

    /// Retransmission timeout between servers, in milliseconds.
    #[arg(short, long, default_value_t = 1000)]
    timeout: u64,

    /// Directory to persist Acceptor/Leader/Replica state under, for
    /// crash recovery. Off by default (in-memory only).
    #[arg(long = "storage-dir")]
    storage_dir: Option<std::path::PathBuf>,

    /// Logging verbosity: unset is silent, `-v` info, `-vv` debug, `-vvv` trace.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbosity: u8,
}

fn init_logging(id: usize, verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Off,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!("[{}][{}][{}]: {}", id, record.level(), record.target(), message))
        })
        .level_for("paxos", level)
        .level_for("mio", log::LevelFilter::Off)
        .chain(std::io::stdout())
        .apply()
        .expect("logger already initialized");
}

#[tokio::main]
async fn main() {
    let opt = Opt::parse();
    init_logging(opt.id, opt.verbosity);

    let addrs: Vec<SocketAddr> = (0..opt.count)
        .map(|i| format!("127.0.0.1:{}", opt.base_port as usize + i).parse().expect("valid socket address"))
        .collect();
    let client_addr: SocketAddr = format!("127.0.0.1:{}", opt.port).parse().expect("valid socket address");

    let mut config = paxos::Config::<chatroom::State>::new(opt.id, addrs, client_addr)
        .with_timeout(std::time::Duration::from_millis(opt.timeout));
    if let Some(dir) = opt.storage_dir {
        config = config.with_storage_dir(dir);
    }

    let _node = config.run().await.expect("failed to start paxos member");
    // This member never calls `invoke` directly: every request arrives
    // over the client listener `Config::run` already spawned. Just park.
    std::future::pending::<()>().await;
}
