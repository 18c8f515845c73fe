use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

use crate::protocol::{encode_frame, FrameReader};

/// Accepts chat peers and hands every line they send to a callback.
///
/// Each peer gets its own thread. With echo on, every line is written back to
/// the peer that sent it.
pub struct PeerListener {
    listener: TcpListener,
    echo: bool,
}

impl PeerListener {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            echo: false,
        })
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Only returns if the listening socket itself fails.
    pub fn serve<F>(&self, on_frame: F) -> io::Result<()>
    where
        F: Fn(SocketAddr, &str) + Send + Sync + 'static,
    {
        let on_frame = Arc::new(on_frame);
        tracing::info!(addr = %self.listener.local_addr()?, echo = self.echo, "listening");

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let on_frame = Arc::clone(&on_frame);
                    let echo = self.echo;
                    thread::spawn(move || {
                        if let Err(e) = handle_peer(stream, echo, &*on_frame) {
                            tracing::warn!("peer error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                }
            }
        }

        Ok(())
    }
}

fn handle_peer<F>(stream: TcpStream, echo: bool, on_frame: &F) -> io::Result<()>
where
    F: Fn(SocketAddr, &str),
{
    let addr = stream.peer_addr()?;
    tracing::info!(%addr, "peer connected");

    let mut writer = stream.try_clone()?;
    for frame in FrameReader::new(stream) {
        let text = frame?;
        on_frame(addr, &text);

        if echo {
            // a line that decoded from one frame never holds a newline
            if let Ok(bytes) = encode_frame(&text) {
                writer.write_all(&bytes)?;
                writer.flush()?;
            }
        }
    }

    tracing::info!(%addr, "peer disconnected");
    Ok(())
}
