// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SLPv2 Service Agent / Directory Agent daemon.
//!
//! Binds the SLP port, joins the SA multicast group (and the DA group when
//! the DA role is enabled), optionally pre-populates the store from a
//! registration file and runs the reactor until SIGINT.
//!
//! Exit codes follow sysexits: 64 usage error, 69 service unavailable
//! (bind/privilege failure), 72 unreadable input file.

use clap::Parser;
use hacn::config::{SLP_DA_MULTICAST_GROUP, SLP_MULTICAST_GROUP, SLP_PORT};
use hacn::engine::{EventHandler, Reactor};
use hacn::slp::{regfile, ScopeSet, ServerConfig, SlpSender, SlpServer};
use mio::event::Event;
use mio::Interest;
use socket2::{Domain, Protocol, Socket, Type};
use std::cell::RefCell;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::path::PathBuf;
use std::process::exit;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const EX_USAGE: i32 = 64;
const EX_UNAVAILABLE: i32 = 69;
const EX_IOERR: i32 = 72;

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_sigint(_: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

/// An SLPv2 Service Agent / Directory Agent for E1.33 deployments.
#[derive(Parser, Debug)]
#[command(name = "hacn-slp-server", version)]
struct Args {
    /// The IP address to listen on.
    #[arg(short, long, default_value = "0.0.0.0")]
    ip: Ipv4Addr,

    /// Logging level, 0 (errors only) to 4 (trace).
    #[arg(short = 'l', long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=4))]
    log_level: u8,

    /// Comma separated list of scopes to operate in.
    #[arg(long, default_value = "default")]
    scopes: String,

    /// File of services to pre-register (scope-csv url lifetime per line).
    #[arg(long)]
    services: Option<PathBuf>,

    /// Disable Directory Agent functionality.
    #[arg(long)]
    no_da: bool,

    /// Don't run the HTTP server (accepted for compatibility; there is no
    /// HTTP server in this build).
    #[arg(long)]
    no_http: bool,

    /// Numeric UID to switch to after binding.
    #[arg(long)]
    setuid: Option<u32>,

    /// Numeric GID to switch to after binding.
    #[arg(long)]
    setgid: Option<u32>,

    /// The SLP port to listen on.
    #[arg(short = 'p', long, default_value_t = SLP_PORT)]
    slp_port: u16,
}

/// Outbound half of the SLP socket.
struct UdpSlpSender {
    socket: UdpSocket,
}

impl SlpSender for UdpSlpSender {
    fn send_to(&mut self, data: &[u8], dest: SocketAddrV4) {
        if let Err(err) = self.socket.send_to(data, SocketAddr::V4(dest)) {
            log::warn!("[SLP] send to {} failed: {}", dest, err);
        }
    }
}

/// Inbound half: drains datagrams into the server.
struct SlpSocketHandler {
    socket: Rc<RefCell<mio::net::UdpSocket>>,
    server: Rc<RefCell<SlpServer>>,
    buffer: Vec<u8>,
}

impl EventHandler for SlpSocketHandler {
    fn ready(&mut self, event: &Event) {
        if !event.is_readable() {
            return;
        }
        loop {
            let received = self.socket.borrow().recv_from(&mut self.buffer);
            match received {
                Ok((len, SocketAddr::V4(source))) => {
                    self.server
                        .borrow_mut()
                        .on_packet(Instant::now(), source, &self.buffer[..len]);
                }
                Ok((_, SocketAddr::V6(source))) => {
                    log::debug!("[SLP] ignoring IPv6 datagram from {}", source);
                }
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => {
                    log::warn!("[SLP] recv failed: {}", err);
                    break;
                }
            }
        }
    }
}

/// Bind the SLP socket and join the discovery groups.
fn setup_slp_socket(args: &Args) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, args.slp_port)).into())?;
    socket.set_nonblocking(true)?;
    let socket: UdpSocket = socket.into();

    socket.join_multicast_v4(&SLP_MULTICAST_GROUP, &args.ip)?;
    if !args.no_da {
        socket.join_multicast_v4(&SLP_DA_MULTICAST_GROUP, &args.ip)?;
    }
    socket.set_multicast_loop_v4(false)?;
    Ok(socket)
}

fn drop_privileges(args: &Args) -> Result<(), String> {
    if let Some(gid) = args.setgid {
        // SAFETY: setgid is async-signal-safe and takes a plain integer.
        if unsafe { libc::setgid(gid) } != 0 {
            return Err(format!("setgid({}) failed", gid));
        }
    }
    if let Some(uid) = args.setuid {
        // SAFETY: as above.
        if unsafe { libc::setuid(uid) } != 0 {
            return Err(format!("setuid({}) failed", uid));
        }
    }
    Ok(())
}

fn run(args: Args) -> i32 {
    // Pre-load the registration file before any sockets exist.
    let services = match &args.services {
        Some(path) => match regfile::parse_file(path) {
            Ok(services) => services,
            Err(err) => {
                eprintln!("cannot read {}: {}", path.display(), err);
                return EX_IOERR;
            }
        },
        None => Vec::new(),
    };

    let socket = match setup_slp_socket(&args) {
        Ok(socket) => socket,
        Err(err) => {
            eprintln!("cannot bind SLP port {}: {}", args.slp_port, err);
            return EX_UNAVAILABLE;
        }
    };
    if let Err(err) = drop_privileges(&args) {
        eprintln!("{}", err);
        return EX_UNAVAILABLE;
    }

    let sender_socket = match socket.try_clone() {
        Ok(clone) => clone,
        Err(err) => {
            eprintln!("cannot clone SLP socket: {}", err);
            return EX_UNAVAILABLE;
        }
    };

    let mut reactor = match Reactor::new() {
        Ok(reactor) => reactor,
        Err(err) => {
            eprintln!("cannot create reactor: {}", err);
            return EX_UNAVAILABLE;
        }
    };
    let handle = match reactor.handle() {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("cannot create reactor handle: {}", err);
            return EX_UNAVAILABLE;
        }
    };

    let boot_timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(1);

    let mut config = ServerConfig::new(args.ip, ScopeSet::from_string(&args.scopes));
    config.enable_da = !args.no_da;
    config.boot_timestamp = boot_timestamp;
    config.slp_port = args.slp_port;

    let sender = Rc::new(RefCell::new(UdpSlpSender {
        socket: sender_socket,
    }));
    let server = SlpServer::new(config, reactor.timers(), sender);

    let mio_socket = Rc::new(RefCell::new(mio::net::UdpSocket::from_std(socket)));
    let handler = Rc::new(RefCell::new(SlpSocketHandler {
        socket: Rc::clone(&mio_socket),
        server: Rc::clone(&server),
        buffer: vec![0u8; 65536],
    }));
    if let Err(err) = handle.register(
        &mut *mio_socket.borrow_mut(),
        Interest::READABLE,
        handler,
    ) {
        eprintln!("cannot register SLP socket: {}", err);
        return EX_UNAVAILABLE;
    }

    {
        let now = Instant::now();
        let mut server = server.borrow_mut();
        server.start(now);
        server.bulk_load(now, services);
    }

    // SAFETY: the handler only touches an atomic flag.
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_sigint as libc::sighandler_t);
    }

    log::info!(
        "[SLP] listening on {}:{} (scopes {}, DA {})",
        args.ip,
        args.slp_port,
        args.scopes,
        if args.no_da { "off" } else { "on" }
    );
    match reactor.run(&RUNNING) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("reactor failed: {}", err);
            EX_UNAVAILABLE
        }
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if err.use_stderr() => {
            eprintln!("{}", err);
            exit(EX_USAGE);
        }
        Err(err) => {
            // --help / --version
            print!("{}", err);
            exit(0);
        }
    };

    stderrlog::new()
        .module(module_path!())
        .module("hacn")
        .verbosity(args.log_level as usize)
        .init()
        .ok();

    if args.no_http {
        log::debug!("[SLP] --no-http accepted; no HTTP server in this build");
    }

    exit(run(args));
}
