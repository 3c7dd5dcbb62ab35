use std::io::{BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

#[cfg(feature = "sync-tls")]
use native_tls::TlsStream;

use crate::opts::Opts;
use crate::pq::error::{PqError, PqResult};

pub enum Stream {
    Tcp(BufReader<TcpStream>),
    #[cfg(feature = "sync-tls")]
    Tls(BufReader<TlsStream<TcpStream>>),
    Unix(BufReader<UnixStream>),
}

impl Stream {
    /// Open the socket described by `opts`.
    ///
    /// A host starting with `/` names the directory holding the server's
    /// Unix socket; `hostaddr` skips name resolution.
    pub fn connect(opts: &Opts) -> PqResult<Self> {
        if opts.hostaddr.is_none() && opts.host.starts_with('/') {
            let path = format!("{}/.s.PGSQL.{}", opts.host, opts.port);
            return Ok(Self::Unix(BufReader::new(UnixStream::connect(path)?)));
        }

        let host = match (&opts.hostaddr, opts.host.as_str()) {
            (Some(addr), _) => addr.as_str(),
            (None, "") => "localhost",
            (None, host) => host,
        };
        let tcp = match opts.connect_timeout {
            Some(timeout) => connect_timeout((host, opts.port), timeout)?,
            None => TcpStream::connect((host, opts.port))?,
        };
        tcp.set_nodelay(true)?;
        Ok(Self::Tcp(BufReader::new(tcp)))
    }

    /// Wrap a plain TCP stream in TLS. `domain` is used for SNI and, for
    /// `verify`, certificate host name checks.
    #[cfg(feature = "sync-tls")]
    pub fn upgrade_to_tls(self, domain: &str, verify: bool) -> PqResult<Self> {
        let Stream::Tcp(reader) = self else {
            return Err(PqError::InvalidUsage(
                "TLS upgrade requires a TCP connection".into(),
            ));
        };
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!verify)
            .danger_accept_invalid_hostnames(!verify)
            .build()?;
        let tls = connector
            .connect(domain, reader.into_inner())
            .map_err(|e| PqError::Auth(format!("TLS handshake failed: {e}")))?;
        Ok(Self::Tls(BufReader::new(tls)))
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.read_exact(buf),
            #[cfg(feature = "sync-tls")]
            Stream::Tls(r) => r.read_exact(buf),
            Stream::Unix(r) => r.read_exact(buf),
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().write_all(buf),
            #[cfg(feature = "sync-tls")]
            Stream::Tls(r) => r.get_mut().write_all(buf),
            Stream::Unix(r) => r.get_mut().write_all(buf),
        }
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().flush(),
            #[cfg(feature = "sync-tls")]
            Stream::Tls(r) => r.get_mut().flush(),
            Stream::Unix(r) => r.get_mut().flush(),
        }
    }

    /// Descriptor of the underlying socket.
    pub fn raw_fd(&self) -> RawFd {
        match self {
            Stream::Tcp(r) => r.get_ref().as_raw_fd(),
            #[cfg(feature = "sync-tls")]
            Stream::Tls(r) => r.get_ref().get_ref().as_raw_fd(),
            Stream::Unix(r) => r.get_ref().as_raw_fd(),
        }
    }
}

fn connect_timeout(addr: (&str, u16), timeout: Duration) -> PqResult<TcpStream> {
    let mut last_error = None;
    for socket_addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&socket_addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(match last_error {
        Some(e) => PqError::Io(e),
        None => PqError::ConnInfo(format!("could not translate host name \"{}\"", addr.0)),
    })
}
